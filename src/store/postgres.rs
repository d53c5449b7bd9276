use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::models::{
    Appointment, AppointmentChanges, Doctor, DoctorChanges, NewAppointment, NewDoctor, NewPatient,
    NewUser, Patient, PatientChanges, User,
};
use crate::schema::{appointments, doctors, patients, users};
use crate::store::{Store, StoreError, StoreResult};

// Database connection pool type
pub type DbPool = Pool<ConnectionManager<PgConnection>>;

type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

// Tables are created on first start. Foreign keys cascade as well, so rows
// removed outside this service still take their appointments with them.
const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    username VARCHAR(150) NOT NULL UNIQUE,
    email VARCHAR(254) NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    date_joined TIMESTAMP NOT NULL
);
CREATE TABLE IF NOT EXISTS patients (
    id SERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    name VARCHAR(100) NOT NULL,
    age INTEGER NOT NULL,
    medical_history TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS patients_user_id_idx ON patients (user_id);
CREATE TABLE IF NOT EXISTS doctors (
    id SERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    specialization VARCHAR(100) NOT NULL,
    contact_info VARCHAR(100) NOT NULL
);
CREATE TABLE IF NOT EXISTS appointments (
    id SERIAL PRIMARY KEY,
    patient_id INTEGER NOT NULL REFERENCES patients (id) ON DELETE CASCADE,
    doctor_id INTEGER NOT NULL REFERENCES doctors (id) ON DELETE CASCADE
);
"#;

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn connect(database_url: &str, pool_size: u32) -> StoreResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().max_size(pool_size).build(manager)?;
        Ok(Self { pool })
    }

    pub fn ensure_schema(&self) -> StoreResult<()> {
        self.conn()?.batch_execute(CREATE_TABLES)?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<DbConn> {
        Ok(self.pool.get()?)
    }
}

// Row locks keep the referenced rows alive until the appointment write commits.
fn check_references(conn: &mut PgConnection, patient_id: i32, doctor_id: i32) -> StoreResult<()> {
    let patient: Option<i32> = patients::table
        .find(patient_id)
        .select(patients::id)
        .for_key_share()
        .first(conn)
        .optional()?;
    if patient.is_none() {
        return Err(StoreError::MissingReference {
            field: "patient",
            id: patient_id,
        });
    }

    let doctor: Option<i32> = doctors::table
        .find(doctor_id)
        .select(doctors::id)
        .for_key_share()
        .first(conn)
        .optional()?;
    if doctor.is_none() {
        return Err(StoreError::MissingReference {
            field: "doctor",
            id: doctor_id,
        });
    }
    Ok(())
}

impl Store for PgStore {
    fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    StoreError::DuplicateUsername
                }
                other => other.into(),
            })
    }

    fn find_user(&self, id: i32) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn list_patients(&self, owner_id: i32) -> StoreResult<Vec<Patient>> {
        let mut conn = self.conn()?;
        Ok(patients::table
            .filter(patients::user_id.eq(owner_id))
            .order(patients::id.asc())
            .select(Patient::as_select())
            .load(&mut conn)?)
    }

    fn find_patient(&self, owner_id: i32, id: i32) -> StoreResult<Option<Patient>> {
        let mut conn = self.conn()?;
        Ok(patients::table
            .filter(patients::id.eq(id))
            .filter(patients::user_id.eq(owner_id))
            .select(Patient::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn create_patient(&self, new_patient: NewPatient) -> StoreResult<Patient> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(patients::table)
            .values(&new_patient)
            .returning(Patient::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_patient(
        &self,
        owner_id: i32,
        id: i32,
        changes: PatientChanges,
    ) -> StoreResult<Option<Patient>> {
        if changes.is_empty() {
            return self.find_patient(owner_id, id);
        }
        let mut conn = self.conn()?;
        Ok(diesel::update(
            patients::table
                .filter(patients::id.eq(id))
                .filter(patients::user_id.eq(owner_id)),
        )
        .set(&changes)
        .returning(Patient::as_returning())
        .get_result(&mut conn)
        .optional()?)
    }

    fn delete_patient(&self, owner_id: i32, id: i32) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let owned: Option<i32> = patients::table
                .filter(patients::id.eq(id))
                .filter(patients::user_id.eq(owner_id))
                .select(patients::id)
                .for_update()
                .first(conn)
                .optional()?;
            if owned.is_none() {
                return Ok(false);
            }
            diesel::delete(appointments::table.filter(appointments::patient_id.eq(id)))
                .execute(conn)?;
            diesel::delete(patients::table.find(id)).execute(conn)?;
            Ok(true)
        })
    }

    fn list_doctors(&self) -> StoreResult<Vec<Doctor>> {
        let mut conn = self.conn()?;
        Ok(doctors::table
            .order(doctors::id.asc())
            .select(Doctor::as_select())
            .load(&mut conn)?)
    }

    fn find_doctor(&self, id: i32) -> StoreResult<Option<Doctor>> {
        let mut conn = self.conn()?;
        Ok(doctors::table
            .find(id)
            .select(Doctor::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn create_doctor(&self, new_doctor: NewDoctor) -> StoreResult<Doctor> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(doctors::table)
            .values(&new_doctor)
            .returning(Doctor::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_doctor(&self, id: i32, changes: DoctorChanges) -> StoreResult<Option<Doctor>> {
        if changes.is_empty() {
            return self.find_doctor(id);
        }
        let mut conn = self.conn()?;
        Ok(diesel::update(doctors::table.find(id))
            .set(&changes)
            .returning(Doctor::as_returning())
            .get_result(&mut conn)
            .optional()?)
    }

    fn delete_doctor(&self, id: i32) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            diesel::delete(appointments::table.filter(appointments::doctor_id.eq(id)))
                .execute(conn)?;
            let deleted = diesel::delete(doctors::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
    }

    fn list_appointments(&self) -> StoreResult<Vec<Appointment>> {
        let mut conn = self.conn()?;
        Ok(appointments::table
            .order(appointments::id.asc())
            .select(Appointment::as_select())
            .load(&mut conn)?)
    }

    fn find_appointment(&self, id: i32) -> StoreResult<Option<Appointment>> {
        let mut conn = self.conn()?;
        Ok(appointments::table
            .find(id)
            .select(Appointment::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn create_appointment(&self, new_appointment: NewAppointment) -> StoreResult<Appointment> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            check_references(conn, new_appointment.patient_id, new_appointment.doctor_id)?;
            Ok(diesel::insert_into(appointments::table)
                .values(&new_appointment)
                .returning(Appointment::as_returning())
                .get_result(conn)?)
        })
    }

    fn update_appointment(
        &self,
        id: i32,
        changes: AppointmentChanges,
    ) -> StoreResult<Option<Appointment>> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let current: Option<Appointment> = appointments::table
                .find(id)
                .select(Appointment::as_select())
                .for_update()
                .first(conn)
                .optional()?;
            let Some(mut updated) = current else {
                return Ok(None);
            };
            if changes.is_empty() {
                return Ok(Some(updated));
            }
            changes.clone().apply(&mut updated);
            check_references(conn, updated.patient_id, updated.doctor_id)?;
            Ok(Some(
                diesel::update(appointments::table.find(id))
                    .set(&changes)
                    .returning(Appointment::as_returning())
                    .get_result(conn)?,
            ))
        })
    }

    fn delete_appointment(&self, id: i32) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(appointments::table.find(id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }
}

// These run only when TEST_DATABASE_URL points at a disposable Postgres database.
#[cfg(test)]
mod tests {
    use std::sync::Once;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    static SCHEMA: Once = Once::new();

    fn test_store() -> Option<PgStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let store = PgStore::connect(&url, 2).expect("test database reachable");
        SCHEMA.call_once(|| store.ensure_schema().expect("tables created"));
        Some(store)
    }

    fn new_user() -> NewUser {
        let username = format!("user-{}", Uuid::new_v4().simple());
        NewUser {
            email: format!("{username}@example.com"),
            username,
            password_hash: "hash".to_string(),
            date_joined: Utc::now().naive_utc(),
        }
    }

    fn new_patient(owner: i32) -> NewPatient {
        NewPatient {
            user_id: owner,
            name: "Bob".to_string(),
            age: 30,
            medical_history: "none".to_string(),
        }
    }

    fn new_doctor() -> NewDoctor {
        NewDoctor {
            name: "House".to_string(),
            specialization: "diagnostics".to_string(),
            contact_info: "555-0100".to_string(),
        }
    }

    fn new_appointment(patient_id: i32, doctor_id: i32) -> NewAppointment {
        NewAppointment {
            patient_id,
            doctor_id,
        }
    }

    #[test]
    fn test_duplicate_username_maps_to_store_error() {
        let Some(store) = test_store() else { return };
        let user = new_user();
        store.create_user(user.clone()).unwrap();

        let err = store.create_user(user).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername));
    }

    #[test]
    fn test_patients_are_scoped_to_owner() {
        let Some(store) = test_store() else { return };
        let alice = store.create_user(new_user()).unwrap();
        let bob = store.create_user(new_user()).unwrap();
        let patient = store.create_patient(new_patient(alice.id)).unwrap();

        assert_eq!(store.list_patients(alice.id).unwrap(), vec![patient.clone()]);
        assert!(store.list_patients(bob.id).unwrap().is_empty());
        assert!(store.find_patient(bob.id, patient.id).unwrap().is_none());
        assert!(!store.delete_patient(bob.id, patient.id).unwrap());

        let changes = PatientChanges {
            age: Some(31),
            ..Default::default()
        };
        assert!(store.update_patient(bob.id, patient.id, changes.clone()).unwrap().is_none());
        let updated = store.update_patient(alice.id, patient.id, changes).unwrap().unwrap();
        assert_eq!(updated.age, 31);
        assert_eq!(updated.name, "Bob");
    }

    #[test]
    fn test_deletes_cascade_to_appointments() {
        let Some(store) = test_store() else { return };
        let alice = store.create_user(new_user()).unwrap();
        let patient = store.create_patient(new_patient(alice.id)).unwrap();
        let doctor = store.create_doctor(new_doctor()).unwrap();
        let other_doctor = store.create_doctor(new_doctor()).unwrap();

        let first = store
            .create_appointment(new_appointment(patient.id, doctor.id))
            .unwrap();
        let second = store
            .create_appointment(new_appointment(patient.id, other_doctor.id))
            .unwrap();

        assert!(store.delete_doctor(doctor.id).unwrap());
        assert!(store.find_appointment(first.id).unwrap().is_none());
        assert_eq!(store.find_appointment(second.id).unwrap(), Some(second.clone()));

        assert!(store.delete_patient(alice.id, patient.id).unwrap());
        assert!(store.find_appointment(second.id).unwrap().is_none());
    }

    #[test]
    fn test_appointment_writes_check_references() {
        let Some(store) = test_store() else { return };
        let alice = store.create_user(new_user()).unwrap();
        let patient = store.create_patient(new_patient(alice.id)).unwrap();
        let doctor = store.create_doctor(new_doctor()).unwrap();

        let err = store
            .create_appointment(new_appointment(patient.id, i32::MAX))
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { field: "doctor", .. }));

        let appointment = store
            .create_appointment(new_appointment(patient.id, doctor.id))
            .unwrap();
        let changes = AppointmentChanges {
            patient_id: Some(i32::MAX),
            ..Default::default()
        };
        let err = store.update_appointment(appointment.id, changes).unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { field: "patient", .. }));
        assert_eq!(store.find_appointment(appointment.id).unwrap(), Some(appointment));
    }
}

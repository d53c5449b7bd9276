use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{
    Appointment, AppointmentChanges, Doctor, DoctorChanges, NewAppointment, NewDoctor, NewPatient,
    NewUser, Patient, PatientChanges, User,
};
use crate::store::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    patients: BTreeMap<i32, Patient>,
    doctors: BTreeMap<i32, Doctor>,
    appointments: BTreeMap<i32, Appointment>,
    last_user_id: i32,
    last_patient_id: i32,
    last_doctor_id: i32,
    last_appointment_id: i32,
}

impl Tables {
    fn check_references(&self, patient_id: i32, doctor_id: i32) -> StoreResult<()> {
        if !self.patients.contains_key(&patient_id) {
            return Err(StoreError::MissingReference {
                field: "patient",
                id: patient_id,
            });
        }
        if !self.doctors.contains_key(&doctor_id) {
            return Err(StoreError::MissingReference {
                field: "doctor",
                id: doctor_id,
            });
        }
        Ok(())
    }
}

fn next_id(last: &mut i32) -> i32 {
    *last += 1;
    *last
}

/// Process-local store. BTreeMaps keep listings in primary-key order.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Store for MemoryStore {
    fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::DuplicateUsername);
        }
        let user = User {
            id: next_id(&mut tables.last_user_id),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            date_joined: new_user.date_joined,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn find_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn list_patients(&self, owner_id: i32) -> StoreResult<Vec<Patient>> {
        Ok(self
            .read()?
            .patients
            .values()
            .filter(|p| p.user_id == owner_id)
            .cloned()
            .collect())
    }

    fn find_patient(&self, owner_id: i32, id: i32) -> StoreResult<Option<Patient>> {
        Ok(self
            .read()?
            .patients
            .get(&id)
            .filter(|p| p.user_id == owner_id)
            .cloned())
    }

    fn create_patient(&self, new_patient: NewPatient) -> StoreResult<Patient> {
        let mut tables = self.write()?;
        let patient = Patient {
            id: next_id(&mut tables.last_patient_id),
            name: new_patient.name,
            age: new_patient.age,
            medical_history: new_patient.medical_history,
            user_id: new_patient.user_id,
        };
        tables.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    fn update_patient(
        &self,
        owner_id: i32,
        id: i32,
        changes: PatientChanges,
    ) -> StoreResult<Option<Patient>> {
        let mut tables = self.write()?;
        match tables.patients.get_mut(&id) {
            Some(patient) if patient.user_id == owner_id => {
                changes.apply(patient);
                Ok(Some(patient.clone()))
            }
            _ => Ok(None),
        }
    }

    fn delete_patient(&self, owner_id: i32, id: i32) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if !tables.patients.get(&id).is_some_and(|p| p.user_id == owner_id) {
            return Ok(false);
        }
        tables.appointments.retain(|_, a| a.patient_id != id);
        tables.patients.remove(&id);
        Ok(true)
    }

    fn list_doctors(&self) -> StoreResult<Vec<Doctor>> {
        Ok(self.read()?.doctors.values().cloned().collect())
    }

    fn find_doctor(&self, id: i32) -> StoreResult<Option<Doctor>> {
        Ok(self.read()?.doctors.get(&id).cloned())
    }

    fn create_doctor(&self, new_doctor: NewDoctor) -> StoreResult<Doctor> {
        let mut tables = self.write()?;
        let doctor = Doctor {
            id: next_id(&mut tables.last_doctor_id),
            name: new_doctor.name,
            specialization: new_doctor.specialization,
            contact_info: new_doctor.contact_info,
        };
        tables.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    fn update_doctor(&self, id: i32, changes: DoctorChanges) -> StoreResult<Option<Doctor>> {
        let mut tables = self.write()?;
        Ok(tables.doctors.get_mut(&id).map(|doctor| {
            changes.apply(doctor);
            doctor.clone()
        }))
    }

    fn delete_doctor(&self, id: i32) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if tables.doctors.remove(&id).is_none() {
            return Ok(false);
        }
        tables.appointments.retain(|_, a| a.doctor_id != id);
        Ok(true)
    }

    fn list_appointments(&self) -> StoreResult<Vec<Appointment>> {
        Ok(self.read()?.appointments.values().cloned().collect())
    }

    fn find_appointment(&self, id: i32) -> StoreResult<Option<Appointment>> {
        Ok(self.read()?.appointments.get(&id).cloned())
    }

    fn create_appointment(&self, new_appointment: NewAppointment) -> StoreResult<Appointment> {
        let mut tables = self.write()?;
        tables.check_references(new_appointment.patient_id, new_appointment.doctor_id)?;
        let appointment = Appointment {
            id: next_id(&mut tables.last_appointment_id),
            patient_id: new_appointment.patient_id,
            doctor_id: new_appointment.doctor_id,
        };
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    fn update_appointment(
        &self,
        id: i32,
        changes: AppointmentChanges,
    ) -> StoreResult<Option<Appointment>> {
        let mut tables = self.write()?;
        let Some(mut updated) = tables.appointments.get(&id).cloned() else {
            return Ok(None);
        };
        changes.apply(&mut updated);
        tables.check_references(updated.patient_id, updated.doctor_id)?;
        tables.appointments.insert(id, updated.clone());
        Ok(Some(updated))
    }

    fn delete_appointment(&self, id: i32) -> StoreResult<bool> {
        Ok(self.write()?.appointments.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "hash".to_string(),
            date_joined: Utc::now().naive_utc(),
        }
    }

    fn new_patient(owner: i32, name: &str) -> NewPatient {
        NewPatient {
            user_id: owner,
            name: name.to_string(),
            age: 30,
            medical_history: "none".to_string(),
        }
    }

    fn new_doctor(name: &str) -> NewDoctor {
        NewDoctor {
            name: name.to_string(),
            specialization: "cardiology".to_string(),
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
    fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice")).unwrap();
        assert!(matches!(
            store.create_user(new_user("alice")),
            Err(StoreError::DuplicateUsername)
        ));
    }

    #[test]
    fn test_patients_scoped_to_owner() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice")).unwrap();
        let bob = store.create_user(new_user("bob")).unwrap();
        let patient = store.create_patient(new_patient(alice.id, "Bob")).unwrap();

        assert_eq!(store.list_patients(alice.id).unwrap(), vec![patient.clone()]);
        assert!(store.list_patients(bob.id).unwrap().is_empty());
        assert!(store.find_patient(bob.id, patient.id).unwrap().is_none());

        let changes = PatientChanges {
            age: Some(31),
            ..Default::default()
        };
        assert!(store.update_patient(bob.id, patient.id, changes.clone()).unwrap().is_none());
        assert!(!store.delete_patient(bob.id, patient.id).unwrap());

        let updated = store.update_patient(alice.id, patient.id, changes).unwrap().unwrap();
        assert_eq!(updated.age, 31);
        assert_eq!(updated.name, "Bob");
    }

    #[test]
    fn test_listing_in_id_order() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store.create_doctor(new_doctor(name)).unwrap();
        }
        let ids: Vec<i32> = store.list_doctors().unwrap().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_delete_patient_cascades() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice")).unwrap();
        let patient = store.create_patient(new_patient(alice.id, "Bob")).unwrap();
        let other = store.create_patient(new_patient(alice.id, "Carol")).unwrap();
        let doctor = store.create_doctor(new_doctor("House")).unwrap();
        store
            .create_appointment(new_appointment(patient.id, doctor.id))
            .unwrap();
        let kept = store
            .create_appointment(new_appointment(other.id, doctor.id))
            .unwrap();

        assert!(store.delete_patient(alice.id, patient.id).unwrap());
        assert_eq!(store.list_appointments().unwrap(), vec![kept]);
    }

    #[test]
    fn test_delete_doctor_cascades() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice")).unwrap();
        let patient = store.create_patient(new_patient(alice.id, "Bob")).unwrap();
        let doctor = store.create_doctor(new_doctor("House")).unwrap();
        store
            .create_appointment(new_appointment(patient.id, doctor.id))
            .unwrap();

        assert!(store.delete_doctor(doctor.id).unwrap());
        assert!(store.list_appointments().unwrap().is_empty());
        assert!(!store.delete_doctor(doctor.id).unwrap());
    }

    #[test]
    fn test_appointment_requires_existing_references() {
        let store = MemoryStore::new();
        let doctor = store.create_doctor(new_doctor("House")).unwrap();

        let err = store
            .create_appointment(new_appointment(42, doctor.id))
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { field: "patient", id: 42 }));
        assert!(store.list_appointments().unwrap().is_empty());
    }

    #[test]
    fn test_appointment_update_checks_references() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice")).unwrap();
        let patient = store.create_patient(new_patient(alice.id, "Bob")).unwrap();
        let doctor = store.create_doctor(new_doctor("House")).unwrap();
        let appointment = store
            .create_appointment(new_appointment(patient.id, doctor.id))
            .unwrap();

        let changes = AppointmentChanges {
            doctor_id: Some(7),
            ..Default::default()
        };
        let err = store.update_appointment(appointment.id, changes).unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { field: "doctor", id: 7 }));
        assert_eq!(store.find_appointment(appointment.id).unwrap(), Some(appointment));
    }
}

// Every Store method is synchronous; handlers call it inside web::block.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    Appointment, AppointmentChanges, Doctor, DoctorChanges, NewAppointment, NewDoctor, NewPatient,
    NewUser, Patient, PatientChanges, User,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already taken")]
    DuplicateUsername,
    #[error("{field} {id} does not exist")]
    MissingReference { field: &'static str, id: i32 },
    #[error("couldn't get db connection from pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for users, patients, doctors and appointments.
///
/// Patient operations take the owning user id and only ever see that
/// user's rows. Deleting a patient or doctor also deletes every
/// appointment that references it. Appointment writes verify both
/// references in the same atomic unit as the write.
pub trait Store: Send + Sync {
    fn create_user(&self, new_user: NewUser) -> StoreResult<User>;
    fn find_user(&self, id: i32) -> StoreResult<Option<User>>;
    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    fn list_patients(&self, owner_id: i32) -> StoreResult<Vec<Patient>>;
    fn find_patient(&self, owner_id: i32, id: i32) -> StoreResult<Option<Patient>>;
    fn create_patient(&self, new_patient: NewPatient) -> StoreResult<Patient>;
    fn update_patient(
        &self,
        owner_id: i32,
        id: i32,
        changes: PatientChanges,
    ) -> StoreResult<Option<Patient>>;
    fn delete_patient(&self, owner_id: i32, id: i32) -> StoreResult<bool>;

    fn list_doctors(&self) -> StoreResult<Vec<Doctor>>;
    fn find_doctor(&self, id: i32) -> StoreResult<Option<Doctor>>;
    fn create_doctor(&self, new_doctor: NewDoctor) -> StoreResult<Doctor>;
    fn update_doctor(&self, id: i32, changes: DoctorChanges) -> StoreResult<Option<Doctor>>;
    fn delete_doctor(&self, id: i32) -> StoreResult<bool>;

    fn list_appointments(&self) -> StoreResult<Vec<Appointment>>;
    fn find_appointment(&self, id: i32) -> StoreResult<Option<Appointment>>;
    fn create_appointment(&self, new_appointment: NewAppointment) -> StoreResult<Appointment>;
    fn update_appointment(
        &self,
        id: i32,
        changes: AppointmentChanges,
    ) -> StoreResult<Option<Appointment>>;
    fn delete_appointment(&self, id: i32) -> StoreResult<bool>;
}

use std::fmt;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::{appointments, doctors, patients, users};

// User - the account that owns patients
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_joined: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub date_joined: NaiveDateTime,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = patients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Patient {
    pub id: i32,
    pub name: String,
    pub age: i32,
    pub medical_history: String,
    #[serde(rename = "user")]
    pub user_id: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = patients)]
pub struct NewPatient {
    pub user_id: i32,
    pub name: String,
    pub age: i32,
    pub medical_history: String,
}

// None fields are left untouched on update
#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = patients)]
pub struct PatientChanges {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub medical_history: Option<String>,
}

impl PatientChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.medical_history.is_none()
    }

    pub fn apply(self, patient: &mut Patient) {
        if let Some(name) = self.name {
            patient.name = name;
        }
        if let Some(age) = self.age {
            patient.age = age;
        }
        if let Some(medical_history) = self.medical_history {
            patient.medical_history = medical_history;
        }
    }
}

impl fmt::Display for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = doctors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Doctor {
    pub id: i32,
    pub name: String,
    pub specialization: String,
    pub contact_info: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = doctors)]
pub struct NewDoctor {
    pub name: String,
    pub specialization: String,
    pub contact_info: String,
}

#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = doctors)]
pub struct DoctorChanges {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub contact_info: Option<String>,
}

impl DoctorChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.specialization.is_none() && self.contact_info.is_none()
    }

    pub fn apply(self, doctor: &mut Doctor) {
        if let Some(name) = self.name {
            doctor.name = name;
        }
        if let Some(specialization) = self.specialization {
            doctor.specialization = specialization;
        }
        if let Some(contact_info) = self.contact_info {
            doctor.contact_info = contact_info;
        }
    }
}

impl fmt::Display for Doctor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// Appointment - bare link between a patient and a doctor
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Appointment {
    pub id: i32,
    #[serde(rename = "patient")]
    pub patient_id: i32,
    #[serde(rename = "doctor")]
    pub doctor_id: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = appointments)]
pub struct NewAppointment {
    pub patient_id: i32,
    pub doctor_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = appointments)]
pub struct AppointmentChanges {
    pub patient_id: Option<i32>,
    pub doctor_id: Option<i32>,
}

impl AppointmentChanges {
    pub fn is_empty(&self) -> bool {
        self.patient_id.is_none() && self.doctor_id.is_none()
    }

    pub fn apply(self, appointment: &mut Appointment) {
        if let Some(patient_id) = self.patient_id {
            appointment.patient_id = patient_id;
        }
        if let Some(doctor_id) = self.doctor_id {
            appointment.doctor_id = doctor_id;
        }
    }
}

//! Wire representation of every resource.
//!
//! Output shapes are the `Serialize` impls of the model structs plus the
//! response types below. Input is read from a raw JSON object field by
//! field, so that every problem in a payload is reported at once, keyed
//! by field name.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{ApiError, FieldErrors};
use crate::models::{
    AppointmentChanges, DoctorChanges, NewAppointment, NewDoctor, NewPatient, NewUser,
    PatientChanges, User,
};

const REQUIRED: &str = "This field is required.";
const NULL: &str = "This field may not be null.";
const BLANK: &str = "This field may not be blank.";
const INVALID_INTEGER: &str = "A valid integer is required.";
const INVALID_STRING: &str = "Not a valid string.";

const NAME_MAX_LENGTH: usize = 100;
const USERNAME_MAX_LENGTH: usize = 150;
const EMAIL_MAX_LENGTH: usize = 254;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern compiles"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern compiles")
});

/// Python-style type names, which API clients already match on in error messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

struct Fields<'a> {
    data: &'a Map<String, Value>,
    partial: bool,
    errors: FieldErrors,
}

impl<'a> Fields<'a> {
    fn new(body: &'a Value, partial: bool) -> Result<Self, ApiError> {
        match body {
            Value::Object(data) => Ok(Self {
                data,
                partial,
                errors: FieldErrors::new(),
            }),
            other => Err(ApiError::non_field(format!(
                "Invalid data. Expected a dictionary, but got {}.",
                type_name(other)
            ))),
        }
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// A partial update skips absent fields instead of flagging them.
    fn present(&mut self, field: &str) -> Option<&'a Value> {
        let data = self.data;
        match data.get(field) {
            None => {
                if !self.partial {
                    self.error(field, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                self.error(field, NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    fn string(&mut self, field: &str, max_length: Option<usize>) -> Option<String> {
        let raw = match self.present(field)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                self.error(field, INVALID_STRING);
                return None;
            }
        };
        let text = raw.trim().to_string();
        if text.is_empty() {
            self.error(field, BLANK);
            return None;
        }
        if let Some(max) = max_length {
            if text.chars().count() > max {
                self.error(
                    field,
                    format!("Ensure this field has no more than {max} characters."),
                );
                return None;
            }
        }
        Some(text)
    }

    fn integer(&mut self, field: &str) -> Option<i32> {
        let parsed = match self.present(field)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|_| i64::MAX))
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e18)
                        .map(|f| f as i64)
                }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(n) = parsed else {
            self.error(field, INVALID_INTEGER);
            return None;
        };
        match i32::try_from(n) {
            Ok(n) => Some(n),
            Err(_) if n > 0 => {
                self.error(
                    field,
                    format!("Ensure this value is less than or equal to {}.", i32::MAX),
                );
                None
            }
            Err(_) => {
                self.error(
                    field,
                    format!("Ensure this value is greater than or equal to {}.", i32::MIN),
                );
                None
            }
        }
    }

    /// Shape check only; whether the row exists is decided by the store.
    fn primary_key(&mut self, field: &str) -> Option<i32> {
        let value = self.present(field)?;
        let candidate = match value {
            Value::Number(n) if !n.is_f64() => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(pk) = candidate else {
            self.error(
                field,
                format!(
                    "Incorrect type. Expected pk value, received {}.",
                    type_name(value)
                ),
            );
            return None;
        };
        match i32::try_from(pk) {
            Ok(pk) => Some(pk),
            Err(_) => {
                self.error(field, format!("Invalid pk \"{pk}\" - object does not exist."));
                None
            }
        }
    }

    fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

fn incomplete(entity: &str) -> ApiError {
    ApiError::Internal(format!("validated {entity} payload is incomplete"))
}

// Register

#[derive(Debug)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn into_new_user(self, password_hash: String) -> NewUser {
        NewUser {
            username: self.username,
            email: self.email,
            password_hash,
            date_joined: Utc::now().naive_utc(),
        }
    }
}

/// Lower-cases the domain part, leaving the local part as typed.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

pub fn register_input(body: &Value) -> Result<RegisterInput, ApiError> {
    let mut fields = Fields::new(body, false)?;

    let username = fields.string("username", Some(USERNAME_MAX_LENGTH));
    if username.as_deref().is_some_and(|u| !USERNAME_RE.is_match(u)) {
        fields.error(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    let email = fields.string("email", Some(EMAIL_MAX_LENGTH));
    if email.as_deref().is_some_and(|e| !EMAIL_RE.is_match(e)) {
        fields.error("email", "Enter a valid email address.");
    }

    let password = fields.string("password", None);
    fields.finish()?;

    match (username, email, password) {
        (Some(username), Some(email), Some(password)) => Ok(RegisterInput {
            username,
            email: normalize_email(&email),
            password,
        }),
        _ => Err(incomplete("register")),
    }
}

/// Registration echo; the password is write-only.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub username: String,
    pub email: String,
}

impl From<User> for RegisterResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
        }
    }
}

// Login

#[derive(Debug)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

pub fn login_input(body: &Value) -> Result<LoginInput, ApiError> {
    let mut fields = Fields::new(body, false)?;
    let username = fields.string("username", None);
    let password = fields.string("password", None);
    fields.finish()?;

    match (username, password) {
        (Some(username), Some(password)) => Ok(LoginInput { username, password }),
        _ => Err(incomplete("login")),
    }
}

// Patient

pub fn patient_changes(body: &Value, partial: bool) -> Result<PatientChanges, ApiError> {
    let mut fields = Fields::new(body, partial)?;
    let changes = PatientChanges {
        name: fields.string("name", Some(NAME_MAX_LENGTH)),
        age: fields.integer("age"),
        medical_history: fields.string("medical_history", None),
    };
    fields.finish()?;
    Ok(changes)
}

/// The owner always comes from the caller; a `user` key in the body is ignored.
pub fn new_patient(body: &Value, owner_id: i32) -> Result<NewPatient, ApiError> {
    match patient_changes(body, false)? {
        PatientChanges {
            name: Some(name),
            age: Some(age),
            medical_history: Some(medical_history),
        } => Ok(NewPatient {
            user_id: owner_id,
            name,
            age,
            medical_history,
        }),
        _ => Err(incomplete("patient")),
    }
}

// Doctor

pub fn doctor_changes(body: &Value, partial: bool) -> Result<DoctorChanges, ApiError> {
    let mut fields = Fields::new(body, partial)?;
    let changes = DoctorChanges {
        name: fields.string("name", Some(NAME_MAX_LENGTH)),
        specialization: fields.string("specialization", Some(NAME_MAX_LENGTH)),
        contact_info: fields.string("contact_info", Some(NAME_MAX_LENGTH)),
    };
    fields.finish()?;
    Ok(changes)
}

pub fn new_doctor(body: &Value) -> Result<NewDoctor, ApiError> {
    match doctor_changes(body, false)? {
        DoctorChanges {
            name: Some(name),
            specialization: Some(specialization),
            contact_info: Some(contact_info),
        } => Ok(NewDoctor {
            name,
            specialization,
            contact_info,
        }),
        _ => Err(incomplete("doctor")),
    }
}

// Appointment

pub fn appointment_changes(body: &Value, partial: bool) -> Result<AppointmentChanges, ApiError> {
    let mut fields = Fields::new(body, partial)?;
    let changes = AppointmentChanges {
        patient_id: fields.primary_key("patient"),
        doctor_id: fields.primary_key("doctor"),
    };
    fields.finish()?;
    Ok(changes)
}

pub fn new_appointment(body: &Value) -> Result<NewAppointment, ApiError> {
    match appointment_changes(body, false)? {
        AppointmentChanges {
            patient_id: Some(patient_id),
            doctor_id: Some(doctor_id),
        } => Ok(NewAppointment {
            patient_id,
            doctor_id,
        }),
        _ => Err(incomplete("appointment")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::models::{Appointment, Patient};

    fn field_errors(result: Result<impl std::fmt::Debug, ApiError>) -> FieldErrors {
        match result {
            Err(ApiError::Validation(fields)) => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_register_collects_all_missing_fields() {
        let errors = field_errors(register_input(&json!({})));
        assert_eq!(errors.len(), 3);
        for field in ["username", "email", "password"] {
            assert_eq!(errors[field], vec![REQUIRED]);
        }
    }

    #[test]
    fn test_register_rejects_bad_email_and_username() {
        let errors = field_errors(register_input(&json!({
            "username": "al ice",
            "email": "not-an-email",
            "password": "p",
        })));
        assert!(errors["username"][0].starts_with("Enter a valid username"));
        assert_eq!(errors["email"], vec!["Enter a valid email address."]);
    }

    #[test]
    fn test_register_normalizes_email_domain() {
        let input = register_input(&json!({
            "username": "alice",
            "email": "Alice@Example.COM",
            "password": " p ",
        }))
        .unwrap();
        assert_eq!(input.email, "Alice@example.com");
        assert_eq!(input.password, "p");
    }

    #[test]
    fn test_whitespace_password_is_blank() {
        let errors = field_errors(register_input(&json!({
            "username": "alice",
            "email": "a@x.com",
            "password": "   ",
        })));
        assert_eq!(errors["password"], vec![BLANK]);

        let errors = field_errors(login_input(&json!({"username": "alice", "password": " "})));
        assert_eq!(errors["password"], vec![BLANK]);
    }

    #[test]
    fn test_body_must_be_an_object() {
        let errors = field_errors(patient_changes(&json!([1, 2]), false));
        assert_eq!(
            errors["non_field_errors"],
            vec!["Invalid data. Expected a dictionary, but got list."]
        );
    }

    #[test]
    fn test_patient_type_errors() {
        let errors = field_errors(new_patient(
            &json!({"name": "   ", "age": "thirty", "medical_history": null}),
            1,
        ));
        assert_eq!(errors["name"], vec![BLANK]);
        assert_eq!(errors["age"], vec![INVALID_INTEGER]);
        assert_eq!(errors["medical_history"], vec![NULL]);
    }

    #[test]
    fn test_patient_age_accepts_integral_strings_and_checks_range() {
        let patient = new_patient(
            &json!({"name": "Bob", "age": "30", "medical_history": "none", "user": 99}),
            1,
        )
        .unwrap();
        assert_eq!(patient.age, 30);
        assert_eq!(patient.user_id, 1);

        let errors = field_errors(patient_changes(&json!({"age": 3_000_000_000u64}), true));
        assert_eq!(
            errors["age"],
            vec!["Ensure this value is less than or equal to 2147483647."]
        );
    }

    #[test]
    fn test_name_length_limit() {
        let long = "x".repeat(101);
        let errors = field_errors(doctor_changes(&json!({"name": long}), true));
        assert_eq!(
            errors["name"],
            vec!["Ensure this field has no more than 100 characters."]
        );
    }

    #[test]
    fn test_partial_update_only_touches_supplied_fields() {
        let changes = patient_changes(&json!({"age": 31}), true).unwrap();
        assert_eq!(
            changes,
            PatientChanges {
                age: Some(31),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_full_update_requires_every_field() {
        let errors = field_errors(doctor_changes(&json!({"name": "House"}), false));
        assert_eq!(errors["specialization"], vec![REQUIRED]);
        assert_eq!(errors["contact_info"], vec![REQUIRED]);
        assert!(!errors.contains_key("name"));
    }

    #[test]
    fn test_appointment_primary_key_types() {
        let errors = field_errors(new_appointment(&json!({"patient": "abc", "doctor": true})));
        assert_eq!(
            errors["patient"],
            vec!["Incorrect type. Expected pk value, received str."]
        );
        assert_eq!(
            errors["doctor"],
            vec!["Incorrect type. Expected pk value, received bool."]
        );

        let appointment = new_appointment(&json!({"patient": "4", "doctor": 2})).unwrap();
        assert_eq!(appointment.patient_id, 4);
        assert_eq!(appointment.doctor_id, 2);
    }

    #[test]
    fn test_output_shapes() {
        let patient = Patient {
            id: 1,
            name: "Bob".into(),
            age: 30,
            medical_history: "none".into(),
            user_id: 5,
        };
        assert_eq!(
            serde_json::to_value(&patient).unwrap(),
            json!({"id": 1, "name": "Bob", "age": 30, "medical_history": "none", "user": 5})
        );

        let appointment = Appointment {
            id: 3,
            patient_id: 1,
            doctor_id: 2,
        };
        assert_eq!(
            serde_json::to_value(&appointment).unwrap(),
            json!({"id": 3, "patient": 1, "doctor": 2})
        );
    }

    #[test]
    fn test_user_serialization_omits_password() {
        let user = User {
            id: 1,
            username: "alice".into(),
            email: "a@x.com".into(),
            password_hash: "$argon2id$secret".into(),
            date_joined: Utc::now().naive_utc(),
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());

        let echo = serde_json::to_value(RegisterResponse::from(user)).unwrap();
        assert_eq!(echo, json!({"username": "alice", "email": "a@x.com"}));
    }
}

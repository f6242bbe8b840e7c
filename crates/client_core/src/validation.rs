//! Declarative form rules checked before any command is dispatched.
//!
//! Field rules run first; cross-field rules only run once every field rule
//! passed. Nothing here performs I/O.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

pub const END_BEFORE_START_MESSAGE: &str = "End time must be greater than the start time.";

pub const MIXED_TIME_ZONES_MESSAGE: &str =
    "Start and end time must both include a time zone offset or both leave it out.";

/// Field values exactly as typed, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawForm {
    fields: BTreeMap<String, String>,
}

impl RawForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Module,
    Course,
    Student,
    TeacherProfile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
    /// Raised by a rule spanning several fields rather than by the field itself.
    pub cross_field: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|err| err.field == field)
    }

    pub fn form_level(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter().filter(|err| err.cross_field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, field: &'static str, message: impl Into<String>, cross_field: bool) {
        self.0.push(FieldError {
            field,
            message: message.into(),
            cross_field,
        });
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|err| err.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Text,
    DateTime,
    Email,
    Rating,
}

struct FieldRule {
    field: &'static str,
    kind: FieldType,
    required: Option<&'static str>,
}

const fn required(field: &'static str, kind: FieldType, message: &'static str) -> FieldRule {
    FieldRule {
        field,
        kind,
        required: Some(message),
    }
}

const fn optional(field: &'static str, kind: FieldType) -> FieldRule {
    FieldRule {
        field,
        kind,
        required: None,
    }
}

struct CrossFieldRule {
    field: &'static str,
    message: &'static str,
    holds: fn(&Normalized) -> bool,
}

const MODULE_FIELDS: &[FieldRule] = &[
    required("title", FieldType::Text, "Module title is required"),
    required("description", FieldType::Text, "Description is required"),
    required("startTime", FieldType::DateTime, "Start time is required"),
    required("endTime", FieldType::DateTime, "End time is required"),
];

const MODULE_CHECKS: &[CrossFieldRule] = &[
    CrossFieldRule {
        field: "endTime",
        message: MIXED_TIME_ZONES_MESSAGE,
        holds: same_time_basis,
    },
    CrossFieldRule {
        field: "endTime",
        message: END_BEFORE_START_MESSAGE,
        holds: ends_after_start,
    },
];

const COURSE_FIELDS: &[FieldRule] = &[
    required("title", FieldType::Text, "Course title is required"),
    required("category", FieldType::Text, "Category is required"),
    optional("description", FieldType::Text),
    optional("image", FieldType::Text),
];

const STUDENT_FIELDS: &[FieldRule] = &[
    required("name", FieldType::Text, "Student name is required"),
    required("email", FieldType::Email, "Email is required"),
    optional("phone", FieldType::Text),
];

// `slug` is shown read-only and never validated or sent.
const TEACHER_PROFILE_FIELDS: &[FieldRule] = &[
    required("name", FieldType::Text, "Name is required"),
    optional("status", FieldType::Text),
    optional("bio", FieldType::Text),
    optional("location", FieldType::Text),
    optional("rating", FieldType::Rating),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldValue {
    Text(String),
    DateTime(Timestamp),
    Rating(u8),
}

/// A parsed date-time. Zoned input is converted to UTC; local input is kept
/// as typed, so the two are only comparable among themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timestamp {
    at: NaiveDateTime,
    zoned: bool,
}

type Normalized = BTreeMap<&'static str, FieldValue>;

fn same_time_basis(values: &Normalized) -> bool {
    match (timestamp(values, "startTime"), timestamp(values, "endTime")) {
        (Some(start), Some(end)) => start.zoned == end.zoned,
        _ => false,
    }
}

// Mixed bases are reported by `same_time_basis` alone.
fn ends_after_start(values: &Normalized) -> bool {
    match (timestamp(values, "startTime"), timestamp(values, "endTime")) {
        (Some(start), Some(end)) if start.zoned == end.zoned => end.at > start.at,
        (Some(_), Some(_)) => true,
        _ => false,
    }
}

fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|at| Timestamp { at, zoned: false })
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw).ok().map(|parsed| Timestamp {
                at: parsed.naive_utc(),
                zoned: true,
            })
        })
}

/// Accepts `datetime-local` input (`YYYY-MM-DDTHH:MM`, optional seconds) and
/// RFC 3339. RFC 3339 values are returned in UTC.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    parse_timestamp(raw).map(|parsed| parsed.at)
}

fn is_plausible_email(raw: &str) -> bool {
    match raw.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn normalize(
    rules: &[FieldRule],
    checks: &[CrossFieldRule],
    raw: &RawForm,
) -> Result<Normalized, ValidationErrors> {
    let mut values = Normalized::new();
    let mut errors = ValidationErrors::default();

    for rule in rules {
        let value = raw.get(rule.field).map(str::trim).unwrap_or_default();
        if value.is_empty() {
            if let Some(message) = rule.required {
                errors.push(rule.field, message, false);
            }
            continue;
        }

        match rule.kind {
            FieldType::Text => {
                values.insert(rule.field, FieldValue::Text(value.to_string()));
            }
            FieldType::Email if is_plausible_email(value) => {
                values.insert(rule.field, FieldValue::Text(value.to_string()));
            }
            FieldType::Email => errors.push(rule.field, "Enter a valid email address", false),
            FieldType::DateTime => match parse_timestamp(value) {
                Some(parsed) => {
                    values.insert(rule.field, FieldValue::DateTime(parsed));
                }
                None => errors.push(rule.field, format!("'{value}' is not a valid date and time"), false),
            },
            FieldType::Rating => match value.parse::<u8>() {
                Ok(rating) if rating <= 5 => {
                    values.insert(rule.field, FieldValue::Rating(rating));
                }
                _ => errors.push(rule.field, "Rating must be a whole number from 0 to 5", false),
            },
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    for check in checks {
        if !(check.holds)(&values) {
            errors.push(check.field, check.message, true);
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

fn text(values: &Normalized, field: &str) -> Option<String> {
    match values.get(field) {
        Some(FieldValue::Text(value)) => Some(value.clone()),
        _ => None,
    }
}

fn timestamp(values: &Normalized, field: &str) -> Option<Timestamp> {
    match values.get(field) {
        Some(FieldValue::DateTime(value)) => Some(*value),
        _ => None,
    }
}

fn datetime(values: &Normalized, field: &str) -> Option<NaiveDateTime> {
    timestamp(values, field).map(|value| value.at)
}

fn rating(values: &Normalized, field: &str) -> Option<u8> {
    match values.get(field) {
        Some(FieldValue::Rating(value)) => Some(*value),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleForm {
    pub title: String,
    pub description: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseForm {
    pub title: String,
    pub category: String,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentForm {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherProfileForm {
    pub name: String,
    pub status: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidForm {
    Module(ModuleForm),
    Course(CourseForm),
    Student(StudentForm),
    TeacherProfile(TeacherProfileForm),
}

pub fn validate(kind: FormKind, raw: &RawForm) -> Result<ValidForm, ValidationErrors> {
    match kind {
        FormKind::Module => validate_module(raw).map(ValidForm::Module),
        FormKind::Course => validate_course(raw).map(ValidForm::Course),
        FormKind::Student => validate_student(raw).map(ValidForm::Student),
        FormKind::TeacherProfile => validate_teacher_profile(raw).map(ValidForm::TeacherProfile),
    }
}

pub fn validate_module(raw: &RawForm) -> Result<ModuleForm, ValidationErrors> {
    let values = normalize(MODULE_FIELDS, MODULE_CHECKS, raw)?;
    let (Some(start_time), Some(end_time)) =
        (datetime(&values, "startTime"), datetime(&values, "endTime"))
    else {
        let mut errors = ValidationErrors::default();
        errors.push("startTime", "Start time is required", false);
        return Err(errors);
    };
    Ok(ModuleForm {
        title: text(&values, "title").unwrap_or_default(),
        description: text(&values, "description").unwrap_or_default(),
        start_time,
        end_time,
    })
}

pub fn validate_course(raw: &RawForm) -> Result<CourseForm, ValidationErrors> {
    let values = normalize(COURSE_FIELDS, &[], raw)?;
    Ok(CourseForm {
        title: text(&values, "title").unwrap_or_default(),
        category: text(&values, "category").unwrap_or_default(),
        description: text(&values, "description").unwrap_or_default(),
        image: text(&values, "image"),
    })
}

pub fn validate_student(raw: &RawForm) -> Result<StudentForm, ValidationErrors> {
    let values = normalize(STUDENT_FIELDS, &[], raw)?;
    Ok(StudentForm {
        name: text(&values, "name").unwrap_or_default(),
        email: text(&values, "email").unwrap_or_default(),
        phone: text(&values, "phone"),
    })
}

pub fn validate_teacher_profile(raw: &RawForm) -> Result<TeacherProfileForm, ValidationErrors> {
    let values = normalize(TEACHER_PROFILE_FIELDS, &[], raw)?;
    Ok(TeacherProfileForm {
        name: text(&values, "name").unwrap_or_default(),
        status: text(&values, "status"),
        bio: text(&values, "bio"),
        location: text(&values, "location"),
        rating: rating(&values, "rating"),
    })
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;

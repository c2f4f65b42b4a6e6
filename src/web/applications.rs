use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    models::{ApplicationRow, ApplicationType, DegreeLevel, NewApplication},
    store::StoreError,
    web::{
        AppState,
        auth::require_admin,
        responses::ApiError,
        uploads::{ParsedForm, SavedUploads, read_form},
    },
};

const REQUIRED_FIELDS: &[&str] = &[
    "full_name",
    "email",
    "gender",
    "phone",
    "university",
    "field_of_study",
    "degree_level",
    "internship_duration",
    "preferred_working_method",
    "application_type",
];

const PHONE_DIGITS: usize = 8;

#[derive(Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize)]
pub struct EmailExists {
    exists: bool,
}

#[derive(Serialize)]
pub struct Submitted {
    success: bool,
    id: i64,
}

#[derive(Serialize)]
pub struct WeeklyCount {
    count: i64,
}

/// Minimal syntax check: an `@` followed somewhere by a `.`.
pub fn is_valid_email(email: &str) -> bool {
    email
        .find('@')
        .is_some_and(|at| email[at + 1..].contains('.'))
}

/// Strips everything but ASCII digits; only exactly eight digits are accepted.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == PHONE_DIGITS).then_some(digits)
}

/// `YYYY-MM-DD`; anything else reads as no preferred start date.
pub fn parse_start_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Monday 00:00 of the ISO week containing `now`, in `now`'s time zone.
pub fn start_of_week<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let monday =
        now.date_naive() - Duration::days(i64::from(now.weekday().num_days_from_monday()));
    let midnight = monday.and_time(NaiveTime::default());
    let zone = now.timezone();
    first_instant_from(midnight, |local| {
        zone.from_local_datetime(local)
            .earliest()
            .map(|start| start.with_timezone(&Utc))
    })
}

/// First existing instant at or after `local`. A DST gap starting at midnight
/// pushes the week start to the end of the gap.
fn first_instant_from(
    local: NaiveDateTime,
    resolve: impl Fn(&NaiveDateTime) -> Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    (0..=12)
        .map(|step| local + Duration::minutes(15 * step))
        .find_map(|candidate| resolve(&candidate))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

fn required_text<'a>(form: &'a ParsedForm, field: &str) -> Result<&'a str, ApiError> {
    form.first_text(field)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing required field `{field}`")))
}

fn selected_subjects(form: &ParsedForm) -> Vec<String> {
    let mut subjects: Vec<String> = Vec::new();
    for value in form.text_values("subjects") {
        let name = value.trim();
        if !name.is_empty() && !subjects.iter().any(|s| s == name) {
            subjects.push(name.to_string());
        }
    }
    subjects
}

pub async fn apply(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Submitted>), ApiError> {
    let form = read_form(multipart)
        .await
        .map_err(|err| ApiError::bad_request(err.message()))?;

    for field in REQUIRED_FIELDS {
        required_text(&form, field)?;
    }

    let email = required_text(&form, "email")?;
    if !is_valid_email(email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let phone = normalize_phone(required_text(&form, "phone")?)
        .ok_or_else(|| ApiError::bad_request("Phone number must contain exactly 8 digits"))?;

    if state.store().application_email_exists(email).await? {
        return Err(ApiError::conflict("Email already used"));
    }

    let subjects = selected_subjects(&form);
    if subjects.is_empty() {
        return Err(ApiError::bad_request("Select at least one subject"));
    }

    let degree_level = DegreeLevel::parse(required_text(&form, "degree_level")?)
        .ok_or_else(|| ApiError::bad_request("Invalid degree level"))?;
    let application_type = ApplicationType::parse(required_text(&form, "application_type")?)
        .ok_or_else(|| ApiError::bad_request("Invalid application type"))?;

    let cv = form
        .first_file_for("cv")
        .ok_or_else(|| ApiError::bad_request("CV is required"))?;
    if !cv.is_pdf() {
        return Err(ApiError::bad_request("CV must be a PDF"));
    }
    let motivation = form.first_file_for("motivation");
    if motivation.is_some_and(|file| !file.is_pdf()) {
        return Err(ApiError::bad_request("Motivation letter must be a PDF"));
    }

    let start_date = parse_start_date(form.first_text("early_start_date"));

    let mut uploads = SavedUploads::new(state.upload_dir());
    let cv_file = uploads.save(cv).await.map_err(ApiError::internal)?;
    let motivation_file = match motivation {
        Some(file) => Some(uploads.save(file).await.map_err(ApiError::internal)?),
        None => None,
    };

    let application = NewApplication {
        full_name: required_text(&form, "full_name")?.to_string(),
        email: email.to_string(),
        gender: required_text(&form, "gender")?.to_string(),
        phone,
        university: required_text(&form, "university")?.to_string(),
        field_of_study: required_text(&form, "field_of_study")?.to_string(),
        degree_level,
        application_type,
        internship_duration: required_text(&form, "internship_duration")?.to_string(),
        preferred_working_method: required_text(&form, "preferred_working_method")?.to_string(),
        start_date,
        cv_file_path: cv_file.public_path(),
        motivation_file_path: motivation_file.map(|file| file.public_path()),
        subjects,
    };

    // The unique constraint is authoritative; the earlier check only spares
    // writing files for the common duplicate case.
    let id = match state.store().insert_application(application).await {
        Ok(id) => id,
        Err(StoreError::Conflict(_)) => return Err(ApiError::conflict("Email already used")),
        Err(err) => return Err(err.into()),
    };
    uploads.keep();

    info!(application_id = id, "application submitted");
    Ok((StatusCode::CREATED, Json(Submitted { success: true, id })))
}

pub async fn email_exists(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<EmailExists>, ApiError> {
    let email = query
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("Email parameter required"))?;

    let exists = state.store().application_email_exists(email).await?;
    Ok(Json(EmailExists { exists }))
}

pub async fn list_applications(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<Vec<ApplicationRow>>, ApiError> {
    require_admin(&state, &jar).await?;
    let rows = state.store().list_applications().await?;
    Ok(Json(rows))
}

pub async fn weekly_applications(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<WeeklyCount>, ApiError> {
    require_admin(&state, &jar).await?;
    let since = start_of_week(&Local::now());
    let count = state.store().count_applications_since(since).await?;
    Ok(Json(WeeklyCount { count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    #[test]
    fn phone_must_normalize_to_eight_digits() {
        assert_eq!(normalize_phone("12-34-56-78").as_deref(), Some("12345678"));
        assert_eq!(normalize_phone(" 12 345 678 ").as_deref(), Some("12345678"));
        assert_eq!(normalize_phone("1234567"), None);
        assert_eq!(normalize_phone("123456789"), None);
        assert_eq!(normalize_phone("phone"), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[test]
    fn email_needs_a_dot_after_the_at_sign() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last@uni.edu.tn"));
        assert!(!is_valid_email("a.b@com"));
        assert!(!is_valid_email("ab.com"));
        assert!(!is_valid_email("a@"));
    }

    #[test]
    fn malformed_start_dates_are_dropped() {
        assert_eq!(
            parse_start_date(Some("2025-07-01")),
            NaiveDate::from_ymd_opt(2025, 7, 1)
        );
        assert_eq!(parse_start_date(Some("01/07/2025")), None);
        assert_eq!(parse_start_date(Some("")), None);
        assert_eq!(parse_start_date(None), None);
    }

    #[test]
    fn week_starts_on_monday_midnight_local_time() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        // Thursday 2025-03-13 15:30 +01:00
        let now = tz.with_ymd_and_hms(2025, 3, 13, 15, 30, 0).unwrap();
        let start = start_of_week(&now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap());
    }

    #[test]
    fn skipped_midnight_moves_week_start_to_end_of_gap() {
        // Local clocks jump from 00:00 to 01:00 at UTC-3, so 01:00 local is 04:00 UTC.
        let midnight = NaiveDate::from_ymd_opt(2024, 9, 9)
            .unwrap()
            .and_time(NaiveTime::default());
        let zone = FixedOffset::west_opt(3 * 3600).unwrap();
        let start = first_instant_from(midnight, |local| {
            if local.hour() < 1 {
                None
            } else {
                zone.from_local_datetime(local)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        });
        assert_eq!(start.to_rfc3339(), "2024-09-09T04:00:00+00:00");

        let existing = first_instant_from(midnight, |local| Some(Utc.from_utc_datetime(local)));
        assert_eq!(existing.to_rfc3339(), "2024-09-09T00:00:00+00:00");
    }

    #[test]
    fn monday_is_its_own_week_start() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 1).unwrap();
        assert_eq!(
            start_of_week(&now),
            Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
        );
    }
}

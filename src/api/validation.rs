//! Input validation for API requests.
//!
//! Validators return `Err(message)` for a single field. Handlers collect them
//! with the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{CreateRequestBody, UpdateRequestBody, UpdateSettingsRequest};

use super::error::ValidationErrorBuilder;

lazy_static! {
    /// Pragmatic email shape check (local@domain.tld)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$"
    ).unwrap();

    /// Phone numbers: optional '+', digits, spaces, dashes and parentheses
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9 ()-]+$").unwrap();

    /// CSS hex color (#rgb or #rrggbb)
    static ref HEX_COLOR_REGEX: Regex = Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap();

    /// Poster paths are TMDB image paths or absolute URLs
    static ref POSTER_REGEX: Regex = Regex::new(r"^(/[A-Za-z0-9._-]+|https?://\S+)$").unwrap();
}

pub const MAX_TITLE_LEN: usize = 300;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_LIMIT: i64 = 10_000;

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() < 2 {
        return Err("Name must be at least 2 characters".to_string());
    }
    if name.chars().count() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }
    Ok(())
}

/// Validate an optional contact number. Empty means "no number".
pub fn validate_phone(phone: &Option<String>) -> Result<(), String> {
    if let Some(p) = phone {
        let p = p.trim();
        if p.is_empty() {
            return Ok(());
        }

        if !PHONE_REGEX.is_match(p) {
            return Err("Phone number may only contain digits, spaces, dashes and a leading '+'".to_string());
        }

        let digits = p.chars().filter(|c| c.is_ascii_digit()).count();
        if !(10..=15).contains(&digits) {
            return Err("Phone number must have between 10 and 15 digits".to_string());
        }
    }
    Ok(())
}

pub fn validate_media_title(title: &str) -> Result<(), String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("Media title is required".to_string());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(format!("Media title is too long (max {} characters)", MAX_TITLE_LEN));
    }
    Ok(())
}

pub fn validate_media_id(id: i64) -> Result<(), String> {
    if id <= 0 {
        return Err("Media id must be a positive number".to_string());
    }
    Ok(())
}

pub fn validate_poster(poster: &Option<String>) -> Result<(), String> {
    if let Some(p) = poster {
        if p.is_empty() {
            return Ok(());
        }
        if p.len() > 2048 || !POSTER_REGEX.is_match(p) {
            return Err("Invalid poster path".to_string());
        }
    }
    Ok(())
}

pub fn validate_description(description: &Option<String>) -> Result<(), String> {
    if let Some(d) = description {
        if d.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(format!(
                "Description is too long (max {} characters)",
                MAX_DESCRIPTION_LEN
            ));
        }
    }
    Ok(())
}

pub fn validate_hex_color(color: &str) -> Result<(), String> {
    if !HEX_COLOR_REGEX.is_match(color) {
        return Err("Color must be a hex value like #1DB954".to_string());
    }
    Ok(())
}

/// Validate a request limit (1 to 10000)
pub fn validate_limit(limit: i64) -> Result<(), String> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(format!("Limit must be between 1 and {}", MAX_LIMIT));
    }
    Ok(())
}

pub fn check_create_request(body: &CreateRequestBody) -> ValidationErrorBuilder {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_media_id(body.media_id) {
        errors.add("media_id", e);
    }
    if let Err(e) = validate_media_title(&body.media_title) {
        errors.add("media_title", e);
    }
    if let Err(e) = validate_poster(&body.media_poster) {
        errors.add("media_poster", e);
    }
    if let Err(e) = validate_description(&body.description) {
        errors.add("description", e);
    }
    if let Err(e) = validate_phone(&body.contact_number) {
        errors.add("contact_number", e);
    }
    errors
}

pub fn check_update_request(body: &UpdateRequestBody) -> ValidationErrorBuilder {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(id) = body.media_id {
        if let Err(e) = validate_media_id(id) {
            errors.add("media_id", e);
        }
    }
    if let Some(ref title) = body.media_title {
        if let Err(e) = validate_media_title(title) {
            errors.add("media_title", e);
        }
    }
    if let Err(e) = validate_poster(&body.media_poster) {
        errors.add("media_poster", e);
    }
    if let Err(e) = validate_description(&body.description) {
        errors.add("description", e);
    }
    if let Err(e) = validate_phone(&body.contact_number) {
        errors.add("contact_number", e);
    }
    errors
}

/// Field checks for a settings update. Limits the update leaves out are taken
/// from `current_day` and `current_week`.
pub fn check_settings_update(
    update: &UpdateSettingsRequest,
    current_day: i64,
    current_week: i64,
) -> ValidationErrorBuilder {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(day) = update.request_limit_per_day {
        if let Err(e) = validate_limit(day) {
            errors.add("request_limit_per_day", e);
        }
    }
    if let Some(week) = update.request_limit_per_week {
        if let Err(e) = validate_limit(week) {
            errors.add("request_limit_per_week", e);
        }
    }

    let day = update.request_limit_per_day.unwrap_or(current_day);
    let week = update.request_limit_per_week.unwrap_or(current_week);
    if day > week {
        errors.add(
            "request_limit_per_day",
            "Daily limit cannot be greater than the weekly limit",
        );
    }

    if let Some(ref color) = update.primary_color {
        if let Err(e) = validate_hex_color(color) {
            errors.add("primary_color", e);
        }
    }
    if let Some(ref message) = update.disabled_message {
        if message.trim().is_empty() {
            errors.add("disabled_message", "Maintenance message cannot be empty");
        }
    }
    if let Some(ref sid) = update.twilio_account_sid {
        let sid = sid.trim();
        if !sid.is_empty() && !sid.starts_with("AC") {
            errors.add("twilio_account_sid", "Account SID must start with AC");
        }
    }
    if let Err(e) = validate_phone(&update.twilio_phone_number) {
        errors.add("twilio_phone_number", e);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MediaType, RequestKind};

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("a.b+tag@sub.example.com.br").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("ana@localhost").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone(&None).is_ok());
        assert!(validate_phone(&Some(String::new())).is_ok());
        assert!(validate_phone(&Some("11999999999".to_string())).is_ok());
        assert!(validate_phone(&Some("+55 (11) 99999-9999".to_string())).is_ok());
        assert!(validate_phone(&Some("12345".to_string())).is_err());
        assert!(validate_phone(&Some("call me".to_string())).is_err());
    }

    #[test]
    fn test_validate_name_and_password() {
        assert!(validate_name("Jo").is_ok());
        assert!(validate_name(" J ").is_err());
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_hex_color() {
        assert!(validate_hex_color("#1DB954").is_ok());
        assert!(validate_hex_color("#fff").is_ok());
        assert!(validate_hex_color("1DB954").is_err());
        assert!(validate_hex_color("#12345").is_err());
    }

    #[test]
    fn test_check_create_request() {
        let body = CreateRequestBody {
            kind: RequestKind::Add,
            media_id: 0,
            media_type: MediaType::Movie,
            media_title: "   ".to_string(),
            media_poster: Some("javascript:alert(1)".to_string()),
            description: None,
            notify_whatsapp: true,
            contact_number: Some("11999999999".to_string()),
        };
        let err = check_create_request(&body).build().unwrap();
        assert!(err.to_string().contains("3 fields"));
    }

    #[test]
    fn test_settings_daily_must_not_exceed_weekly() {
        let update = UpdateSettingsRequest {
            request_limit_per_day: Some(60),
            ..Default::default()
        };
        assert!(!check_settings_update(&update, 10, 50).is_empty());

        let update = UpdateSettingsRequest {
            request_limit_per_day: Some(60),
            request_limit_per_week: Some(100),
            ..Default::default()
        };
        assert!(check_settings_update(&update, 10, 50).is_empty());

        let update = UpdateSettingsRequest {
            request_limit_per_week: Some(0),
            ..Default::default()
        };
        assert!(!check_settings_update(&update, 10, 50).is_empty());
    }
}

//! Browser form handling
//!
//! Forms are deserialized leniently (missing fields become empty strings) and
//! then validated into a `FormErrors`, which templates render next to each
//! field. Errors reported by the remote API are merged into the same structure
//! by `api_errors`.

pub mod api_errors;
pub mod user_forms;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

pub use user_forms::{
    ChangePasswordForm, EditProfileForm, LoginForm, RegenerateTokenForm, ResetPasswordForm,
    SignupForm,
};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").unwrap());

/// Interface languages a user can pick, as (code, label).
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en-AU", "Australian"),
    ("en-PIRAT", "Pirate"),
    ("sv-CHEF", "Swedish Chef"),
];

pub const DEFAULT_TIMEZONE: &str = "Australia/Sydney";
pub const DEFAULT_LANGUAGE: &str = "en-AU";

const TIMEZONE_REGIONS: &[&str] = &[
    "Africa",
    "America",
    "Antarctica",
    "Arctic",
    "Asia",
    "Atlantic",
    "Australia",
    "Europe",
    "Indian",
    "Pacific",
];

/// Old names kept by the tz database for compatibility. Users pick the
/// current name instead.
const BACKWARD_ALIASES: &[&str] = &[
    "Africa/Asmera",
    "Africa/Timbuktu",
    "America/Argentina/ComodRivadavia",
    "America/Atka",
    "America/Buenos_Aires",
    "America/Catamarca",
    "America/Coral_Harbour",
    "America/Cordoba",
    "America/Ensenada",
    "America/Fort_Wayne",
    "America/Godthab",
    "America/Indianapolis",
    "America/Jujuy",
    "America/Knox_IN",
    "America/Louisville",
    "America/Mendoza",
    "America/Montreal",
    "America/Nipigon",
    "America/Pangnirtung",
    "America/Porto_Acre",
    "America/Rainy_River",
    "America/Rosario",
    "America/Santa_Isabel",
    "America/Shiprock",
    "America/Thunder_Bay",
    "America/Virgin",
    "America/Yellowknife",
    "Antarctica/South_Pole",
    "Asia/Ashkhabad",
    "Asia/Calcutta",
    "Asia/Chongqing",
    "Asia/Chungking",
    "Asia/Dacca",
    "Asia/Harbin",
    "Asia/Istanbul",
    "Asia/Kashgar",
    "Asia/Katmandu",
    "Asia/Macao",
    "Asia/Rangoon",
    "Asia/Saigon",
    "Asia/Tel_Aviv",
    "Asia/Thimbu",
    "Asia/Ujung_Pandang",
    "Asia/Ulan_Bator",
    "Atlantic/Faeroe",
    "Atlantic/Jan_Mayen",
    "Australia/ACT",
    "Australia/Canberra",
    "Australia/Currie",
    "Australia/LHI",
    "Australia/NSW",
    "Australia/North",
    "Australia/Queensland",
    "Australia/South",
    "Australia/Tasmania",
    "Australia/Victoria",
    "Australia/West",
    "Australia/Yancowinna",
    "Europe/Belfast",
    "Europe/Kiev",
    "Europe/Nicosia",
    "Europe/Tiraspol",
    "Europe/Uzhgorod",
    "Europe/Zaporozhye",
    "Pacific/Enderbury",
    "Pacific/Johnston",
    "Pacific/Ponape",
    "Pacific/Samoa",
    "Pacific/Truk",
    "Pacific/Yap",
];

/// Outside the regions but still commonly picked.
const EXTRA_TIMEZONES: &[&str] = &[
    "Canada/Atlantic",
    "Canada/Central",
    "Canada/Eastern",
    "Canada/Mountain",
    "Canada/Newfoundland",
    "Canada/Pacific",
    "GMT",
    "US/Alaska",
    "US/Arizona",
    "US/Central",
    "US/Eastern",
    "US/Hawaii",
    "US/Mountain",
    "US/Pacific",
    "UTC",
];

static COMMON_TIMEZONES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut zones: Vec<&'static str> = chrono_tz::TZ_VARIANTS
        .iter()
        .map(|tz| tz.name())
        .filter(|name| {
            name.split_once('/')
                .map(|(region, _)| TIMEZONE_REGIONS.contains(&region))
                .unwrap_or(false)
        })
        .filter(|name| !BACKWARD_ALIASES.contains(name))
        .chain(EXTRA_TIMEZONES.iter().copied())
        .collect();
    zones.sort_unstable();
    zones.dedup();
    zones
});

/// Zone names offered in timezone selects.
pub fn common_timezones() -> &'static [&'static str] {
    &COMMON_TIMEZONES
}

pub fn is_common_timezone(name: &str) -> bool {
    COMMON_TIMEZONES.binary_search(&name).is_ok()
}

/// Per-field and form-wide validation errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
    non_field: Vec<String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, name: &str) -> bool {
        !self.field(name).is_empty()
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }
}

/// One `<option>` of a select box.
#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

pub fn timezone_options(selected: &str) -> Vec<SelectOption> {
    common_timezones()
        .iter()
        .map(|name| SelectOption {
            value: name.to_string(),
            label: name.to_string(),
            selected: *name == selected,
        })
        .collect()
}

pub fn language_options(selected: &str) -> Vec<SelectOption> {
    LANGUAGES
        .iter()
        .map(|(code, label)| SelectOption {
            value: code.to_string(),
            label: label.to_string(),
            selected: *code == selected,
        })
        .collect()
}

pub(crate) fn check_required(errors: &mut FormErrors, field: &str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.add(field, REQUIRED);
        return false;
    }
    true
}

pub(crate) fn check_max_length(errors: &mut FormErrors, field: &str, value: &str, max: usize) {
    let length = value.chars().count();
    if length > max {
        errors.add(
            field,
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                max, length
            ),
        );
    }
}

pub(crate) fn check_email(errors: &mut FormErrors, field: &str, value: &str) {
    if !check_required(errors, field, value) {
        return;
    }
    if !EMAIL_PATTERN.is_match(value.trim()) {
        errors.add(field, INVALID_EMAIL);
    }
    check_max_length(errors, field, value.trim(), 255);
}

pub(crate) fn check_choice(errors: &mut FormErrors, field: &str, value: &str, valid: bool) {
    if !check_required(errors, field, value) {
        return;
    }
    if !valid {
        errors.add(
            field,
            format!(
                "Select a valid choice. {} is not one of the available choices.",
                value
            ),
        );
    }
}

pub(crate) fn is_language(code: &str) -> bool {
    LANGUAGES.iter().any(|(known, _)| *known == code)
}

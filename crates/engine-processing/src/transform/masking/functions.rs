use super::MaskContext;
use crate::error::MaskError;
use chrono::{Duration, NaiveDate, Utc};
use model::{describe::FieldKind, manifest::Library};
use rand::{Rng, distributions::Alphanumeric, seq::SliceRandom};
use serde_json::{Number, Value};

const DEFAULT_STRING_LENGTH: usize = 10;
const DEFAULT_EMAIL_DOMAIN: &str = "example.com";
const DEFAULT_PHONE_PATTERN: &str = "(###) ###-####";
const DEFAULT_MIN_DATE: &str = "1950-01-01";
/// Longest text a field can hold (long text area).
const MAX_STRING_LENGTH: usize = 131_072;

fn number_param(value: Option<&Value>, name: &'static str) -> Result<f64, MaskError> {
    let value = value.ok_or(MaskError::MissingParameter(name))?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        Some(n) => Err(MaskError::InvalidParameter {
            name,
            reason: format!("{n} is not a finite number"),
        }),
        None => Err(MaskError::InvalidParameter {
            name,
            reason: format!("expected a number, got {value}"),
        }),
    }
}

fn date_param(
    value: Option<&Value>,
    name: &'static str,
    default: NaiveDate,
) -> Result<NaiveDate, MaskError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let text = value.as_str().ok_or_else(|| MaskError::InvalidParameter {
        name,
        reason: format!("expected a date, got {value}"),
    })?;
    // Datetime bounds are accepted; only their date part matters.
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| MaskError::InvalidParameter {
        name,
        reason: e.to_string(),
    })
}

fn random_alnum(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Replaces the rule's `value` as is.
pub fn fixed(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    ctx.rule
        .value
        .clone()
        .ok_or(MaskError::MissingParameter("value"))
}

pub fn blank(_ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    Ok(Value::Null)
}

/// Uniform number in `[minValue, maxValue]`, rounded to the field scale.
pub fn random_number(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let min = number_param(ctx.rule.min_value.as_ref(), "minValue")?;
    let max = number_param(ctx.rule.max_value.as_ref(), "maxValue")?;
    if min > max {
        return Err(MaskError::InvalidParameter {
            name: "minValue",
            reason: format!("{min} is greater than maxValue {max}"),
        });
    }
    if !(max - min).is_finite() {
        return Err(MaskError::InvalidParameter {
            name: "maxValue",
            reason: format!("range {min}..{max} is too wide"),
        });
    }

    let raw = if min == max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };

    if ctx.field.scale == 0 || ctx.field.kind() == FieldKind::Integer {
        return Ok(Value::Number(Number::from(raw.round() as i64)));
    }

    let factor = 10f64.powi(ctx.field.scale as i32);
    let rounded = (raw * factor).round() / factor;
    Number::from_f64(rounded)
        .map(Value::Number)
        .ok_or_else(|| MaskError::InvalidParameter {
            name: "maxValue",
            reason: "bounds produce a non-finite number".to_string(),
        })
}

/// Alphanumeric text; length from `value`, else the field length. Never
/// longer than the field.
pub fn random_string(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let limit = ctx.field.max_length().unwrap_or(MAX_STRING_LENGTH);
    let length = match ctx.rule.value.as_ref() {
        Some(v) => {
            let requested = number_param(Some(v), "value")?;
            if requested < 0.0 {
                return Err(MaskError::InvalidParameter {
                    name: "value",
                    reason: format!("length {requested} is negative"),
                });
            }
            requested.min(limit as f64) as usize
        }
        None => ctx.field.max_length().unwrap_or(DEFAULT_STRING_LENGTH),
    };
    Ok(Value::String(random_alnum(length)))
}

/// Random local part at the domain given in `value`.
pub fn random_email(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let domain = ctx
        .rule
        .value
        .as_ref()
        .and_then(Value::as_str)
        .map(|d| d.trim_start_matches('@'))
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_EMAIL_DOMAIN);

    Ok(Value::String(format!(
        "{}@{domain}",
        random_alnum(12).to_lowercase()
    )))
}

/// Phone number following the `value` pattern, `#` standing for a digit.
pub fn random_phone(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let pattern = ctx
        .rule
        .value
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PHONE_PATTERN);

    let mut rng = rand::thread_rng();
    let phone = pattern
        .chars()
        .map(|c| {
            if c == '#' {
                char::from(b'0' + rng.gen_range(0..10u8))
            } else {
                c
            }
        })
        .collect();
    Ok(Value::String(phone))
}

/// Date in `[minValue, maxValue]` (defaults 1950-01-01 and today). Datetime
/// fields get a random time of day.
pub fn random_date(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let today = Utc::now().date_naive();
    let default_min = NaiveDate::parse_from_str(DEFAULT_MIN_DATE, "%Y-%m-%d").unwrap_or(today);
    let min = date_param(ctx.rule.min_value.as_ref(), "minValue", default_min)?;
    let max = date_param(ctx.rule.max_value.as_ref(), "maxValue", today)?;
    if min > max {
        return Err(MaskError::InvalidParameter {
            name: "minValue",
            reason: format!("{min} is after maxValue {max}"),
        });
    }

    let mut rng = rand::thread_rng();
    let days = (max - min).num_days();
    let date = min + Duration::days(rng.gen_range(0..=days));

    if ctx.field.kind() == FieldKind::DateTime {
        let secs = rng.gen_range(0..86_400u32);
        if let Some(stamp) = date.and_hms_opt(secs / 3600, (secs / 60) % 60, secs % 60) {
            return Ok(Value::String(
                stamp.and_utc().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            ));
        }
    }
    Ok(Value::String(date.format("%Y-%m-%d").to_string()))
}

/// Random entry of the lookup table named by `value`.
pub fn library(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let name = ctx
        .rule
        .value
        .as_ref()
        .and_then(Value::as_str)
        .ok_or(MaskError::MissingParameter("value"))?;
    let library = ctx
        .libraries
        .get(name)
        .ok_or_else(|| MaskError::UnknownLibrary(name.to_string()))?;

    let mut rng = rand::thread_rng();
    let picked = match library {
        Library::Strings(values) => values.choose(&mut rng).cloned().map(Value::String),
        Library::Numbers(values) => values
            .choose(&mut rng)
            .and_then(|n| Number::from_f64(*n))
            .map(Value::Number),
    };
    picked.ok_or_else(|| MaskError::EmptyLibrary(name.to_string()))
}

/// Random active value of the field's picklist.
pub fn picklist(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let active: Vec<&str> = ctx
        .field
        .picklist_values
        .iter()
        .filter(|p| p.active)
        .map(|p| p.value.as_str())
        .collect();

    active
        .choose(&mut rand::thread_rng())
        .map(|v| Value::String(v.to_string()))
        .ok_or_else(|| MaskError::NoPicklistValues(ctx.field.name.clone()))
}

/// Deterministic digest of the original value, so equal inputs stay equal.
pub fn hash(ctx: &MaskContext<'_>) -> Result<Value, MaskError> {
    let text = match ctx.original {
        Value::Null => return Ok(Value::Null),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(Value::String(
        blake3::hash(text.as_bytes()).to_hex().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        describe::FieldDescribe,
        manifest::{Libraries, Library},
        rules::FieldRule,
    };
    use serde_json::json;

    fn run(
        f: fn(&MaskContext<'_>) -> Result<Value, MaskError>,
        rule: FieldRule,
        field: FieldDescribe,
        original: Value,
    ) -> Result<Value, MaskError> {
        let mut libraries = Libraries::new();
        libraries.insert(
            "companies".into(),
            Library::Strings(vec!["Initech".into(), "Globex".into()]),
        );
        libraries.insert("empty".into(), Library::Numbers(vec![]));

        f(&MaskContext {
            rule: &rule,
            field: &field,
            original: &original,
            libraries: &libraries,
        })
    }

    #[test]
    fn fixed_requires_a_value() {
        let field = FieldDescribe::new("Name", "string");
        assert_eq!(
            run(fixed, FieldRule::new("FIXED").with_value(json!("X")), field.clone(), json!("a")).unwrap(),
            json!("X")
        );
        assert!(matches!(
            run(fixed, FieldRule::new("FIXED"), field, json!("a")),
            Err(MaskError::MissingParameter("value"))
        ));
    }

    #[test]
    fn random_number_respects_bounds_and_scale() {
        let field = FieldDescribe::new("AnnualRevenue", "currency").with_scale(18, 2);
        for _ in 0..50 {
            let rule = FieldRule::new("RANDOM_NUMBER").with_bounds(json!(10), json!("20.5"));
            let value = run(random_number, rule, field.clone(), Value::Null)
                .unwrap()
                .as_f64()
                .unwrap();
            assert!((10.0..=20.5).contains(&value));
            let decimals = value.to_string().split('.').nth(1).map_or(0, str::len);
            assert!(decimals <= 2);
        }

        let int_field = FieldDescribe::new("NumberOfEmployees", "int");
        let rule = FieldRule::new("RANDOM_NUMBER").with_bounds(json!(1), json!(3));
        assert!(run(random_number, rule, int_field, Value::Null).unwrap().is_i64());
    }

    #[test]
    fn random_number_rejects_inverted_bounds() {
        let rule = FieldRule::new("RANDOM_NUMBER").with_bounds(json!(5), json!(1));
        assert!(matches!(
            run(random_number, rule, FieldDescribe::new("N", "double"), Value::Null),
            Err(MaskError::InvalidParameter { name: "minValue", .. })
        ));
    }

    #[test]
    fn random_number_rejects_non_finite_bounds() {
        let field = FieldDescribe::new("N", "double");
        let cases = [
            (json!("NaN"), json!(5), "minValue"),
            (json!(0), json!("inf"), "maxValue"),
            (json!(-1e308), json!(1e308), "maxValue"),
        ];
        for (min, max, param) in cases {
            let rule = FieldRule::new("RANDOM_NUMBER").with_bounds(min, max);
            match run(random_number, rule, field.clone(), Value::Null) {
                Err(MaskError::InvalidParameter { name, .. }) => assert_eq!(name, param),
                other => panic!("expected an invalid {param}, got {other:?}"),
            }
        }
    }

    #[test]
    fn random_string_length_is_bounded() {
        let field = FieldDescribe::new("Code", "string").with_length(16);
        let rule = FieldRule::new("RANDOM_STRING").with_value(json!(1e12));
        let value = run(random_string, rule, field.clone(), Value::Null).unwrap();
        assert_eq!(value.as_str().unwrap().len(), 16);

        let rule = FieldRule::new("RANDOM_STRING").with_value(json!(5));
        let value = run(random_string, rule, field.clone(), Value::Null).unwrap();
        assert_eq!(value.as_str().unwrap().len(), 5);

        for bad in [json!(-3), json!("NaN")] {
            let rule = FieldRule::new("RANDOM_STRING").with_value(bad);
            assert!(matches!(
                run(random_string, rule, field.clone(), Value::Null),
                Err(MaskError::InvalidParameter { name: "value", .. })
            ));
        }
    }

    #[test]
    fn random_string_uses_field_length() {
        let field = FieldDescribe::new("Name", "string").with_length(7);
        let value = run(random_string, FieldRule::new("RANDOM_STRING"), field, Value::Null).unwrap();
        assert_eq!(value.as_str().unwrap().len(), 7);
    }

    #[test]
    fn email_and_phone_follow_parameters() {
        let rule = FieldRule::new("RANDOM_EMAIL").with_value(json!("@corp.test"));
        let email = run(random_email, rule, FieldDescribe::new("Email", "email"), Value::Null).unwrap();
        assert!(email.as_str().unwrap().ends_with("@corp.test"));

        let rule = FieldRule::new("RANDOM_PHONE").with_value(json!("+1 ###-####"));
        let phone = run(random_phone, rule, FieldDescribe::new("Phone", "phone"), Value::Null).unwrap();
        let phone = phone.as_str().unwrap();
        assert!(phone.starts_with("+1 "));
        assert_eq!(phone.len(), 11);
        assert!(!phone.contains('#'));
    }

    #[test]
    fn random_date_stays_in_range() {
        let rule = FieldRule::new("RANDOM_DATE").with_bounds(json!("2020-01-01"), json!("2020-01-31"));
        let value = run(random_date, rule.clone(), FieldDescribe::new("Birthdate", "date"), Value::Null).unwrap();
        let date = NaiveDate::parse_from_str(value.as_str().unwrap(), "%Y-%m-%d").unwrap();
        assert_eq!(date.format("%Y-%m").to_string(), "2020-01");

        let value = run(random_date, rule, FieldDescribe::new("LastSeen", "datetime"), Value::Null).unwrap();
        assert!(value.as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn library_picks_from_named_table() {
        let rule = FieldRule::new("LIBRARY").with_value(json!("companies"));
        let value = run(library, rule, FieldDescribe::new("Name", "string"), Value::Null).unwrap();
        assert!(["Initech", "Globex"].contains(&value.as_str().unwrap()));

        let rule = FieldRule::new("LIBRARY").with_value(json!("missing"));
        assert!(matches!(
            run(library, rule, FieldDescribe::new("Name", "string"), Value::Null),
            Err(MaskError::UnknownLibrary(_))
        ));

        let rule = FieldRule::new("LIBRARY").with_value(json!("empty"));
        assert!(matches!(
            run(library, rule, FieldDescribe::new("Name", "string"), Value::Null),
            Err(MaskError::EmptyLibrary(_))
        ));
    }

    #[test]
    fn picklist_only_uses_active_values() {
        let mut field = FieldDescribe::new("Rating", "picklist").with_picklist(&["Hot", "Cold"]);
        field.picklist_values[0].active = false;

        for _ in 0..10 {
            let value = run(picklist, FieldRule::new("PICKLIST"), field.clone(), Value::Null).unwrap();
            assert_eq!(value, json!("Cold"));
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let field = FieldDescribe::new("Email", "email");
        let a = run(hash, FieldRule::new("HASH"), field.clone(), json!("a@b.c")).unwrap();
        let b = run(hash, FieldRule::new("HASH"), field.clone(), json!("a@b.c")).unwrap();
        let c = run(hash, FieldRule::new("HASH"), field.clone(), json!("x@y.z")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(run(hash, FieldRule::new("HASH"), field, Value::Null).unwrap(), Value::Null);
    }
}

/// Display-only masking of PII for logs and API responses
///
/// Every helper here is a pure transform that keeps just enough of the
/// original value to be recognizable to its owner. Masked values are never
/// stored and never reversible; persistence goes through `encryption`.
use serde_json::Value;

/// Mask an email, keeping the first three characters of the local part and
/// the full domain: `abcdef@example.com` → `abc***@example.com`.
///
/// Locals of three characters or fewer pass through unchanged, as do inputs
/// without an `@`.
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return email.to_string();
    };

    if local.chars().count() <= 3 {
        return format!("{}@{}", local, domain);
    }

    let prefix: String = local.chars().take(3).collect();
    format!("{}***@{}", prefix, domain)
}

/// Mask a phone number, keeping the last four digits: `***-***-4567`.
pub fn mask_phone(phone: &str) -> String {
    if phone.chars().count() < 4 {
        return phone.to_string();
    }

    let last4: String = phone
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***-***-{}", last4)
}

/// Mask a display name down to initials: `Arjuna Dasa` → `A*** D***`.
pub fn mask_name(name: &str) -> String {
    let parts: Vec<&str> = name.split(' ').filter(|p| !p.is_empty()).collect();

    match parts.as_slice() {
        [] => name.to_string(),
        [only] => format!("{}***", first_char(only)),
        [first, .., last] => format!("{}*** {}***", first_char(first), first_char(last)),
    }
}

/// Mask a credit card number, keeping the last four digits.
pub fn mask_credit_card(card: &str) -> String {
    if card.chars().count() < 4 {
        return card.to_string();
    }

    let last4: String = card
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****-****-****-{}", last4)
}

/// Mask an SSN, keeping the last four digits: `123456789` → `***-**-6789`.
pub fn mask_ssn(ssn: &str) -> String {
    if ssn.chars().count() < 4 {
        return ssn.to_string();
    }

    let last4: String = ssn
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***-**-{}", last4)
}

/// Replace the named fields of a JSON object with `"[REDACTED]"`.
///
/// Used by audit logging before request/response bodies hit the log stream.
pub fn redact_fields(value: &Value, fields: &[&str]) -> Value {
    let Some(obj) = value.as_object() else {
        return value.clone();
    };

    let mut out = obj.clone();
    for field in fields {
        if out.contains_key(*field) {
            out.insert(field.to_string(), Value::String("[REDACTED]".to_string()));
        }
    }
    Value::Object(out)
}

fn first_char(s: &str) -> String {
    s.chars().next().map(String::from).unwrap_or_default()
}

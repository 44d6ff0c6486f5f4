//! Name rules shared by migration and seeder files.

use once_cell::sync::Lazy;
use regex::Regex;

static CAMEL_CASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][a-z0-9]+)+$").expect("valid camel case regex"));

/// `CreateUsers`, `AddEmailToUsers2`; not `createUsers`, `Create_Users`, `HTTPLog`
pub fn is_camel_case(name: &str) -> bool {
    CAMEL_CASE.is_match(name)
}

/// `AddEmailToUsers` -> `add_email_to_users`
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `add_email_to_users` -> `AddEmailToUsers`
pub fn snake_to_camel(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_rule() {
        assert!(is_camel_case("CreateUsers"));
        assert!(is_camel_case("AddIndex2"));
        assert!(!is_camel_case("createUsers"));
        assert!(!is_camel_case("Create_Users"));
        assert!(!is_camel_case("HTTPLog"));
        assert!(!is_camel_case(""));
    }

    #[test]
    fn conversions_are_inverse() {
        assert_eq!(camel_to_snake("AddEmailToUsers"), "add_email_to_users");
        assert_eq!(snake_to_camel("add_email_to_users"), "AddEmailToUsers");
        assert_eq!(snake_to_camel(&camel_to_snake("CreateUsers")), "CreateUsers");
    }
}

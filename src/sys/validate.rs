// src/sys/validate.rs
//
// Input validation. Every identifier that ends up in a config file path, a
// rendered template, or an external command line passes through one of these
// before anything touches the filesystem.

/// Site names become filenames under sites-available and log prefixes.
pub fn validate_site_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Site name cannot be empty".to_string());
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(format!("Path traversal detected in site name: '{name}'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(format!("Invalid characters in site name: '{name}'"));
    }
    Ok(())
}

/// Unix user and group names, as fed to SuexecUserGroup and chown.
pub fn validate_unix_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("User/group name cannot be empty".to_string());
    }
    if name.starts_with('-') {
        return Err(format!("User/group name cannot start with '-': '{name}'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!("Invalid characters in user/group name: '{name}'"));
    }
    Ok(())
}

/// Identifiers interpolated into SQL statements (database names, charsets,
/// collations). The character class keeps them backtick- and quote-safe.
pub fn validate_sql_identifier(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("Missing {kind}"));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("Invalid {kind}: '{value}'"));
    }
    Ok(())
}

/// Debian package names, including '+' ('g++'), '.' and ':any' qualifiers.
pub fn validate_package_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Package name cannot be empty".to_string());
    }
    // A leading '-' would be parsed as an apt-get option.
    if name.starts_with('-') {
        return Err(format!("Package name cannot start with '-': '{name}'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.:".contains(c))
    {
        return Err(format!("Invalid package name: '{name}'"));
    }
    Ok(())
}

/// Ubuntu archive mirrors are keyed by two-letter country codes.
pub fn validate_country_code(code: &str) -> Result<(), String> {
    let valid = code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase());
    if !valid {
        return Err(format!(
            "Mirror country code must be two lowercase letters, got '{code}'"
        ));
    }
    Ok(())
}

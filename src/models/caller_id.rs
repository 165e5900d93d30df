//! `"Name" <Number>` caller id strings as stored on SIP endpoints

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, AppResult};

lazy_static! {
    static ref CALLER_ID_REGEX: Regex =
        Regex::new(r#"^"(?P<name>[^"]+)"(?:\s+<(?P<num>\+?[\dA-Z]+)>)?"#)
            .expect("caller id pattern must compile");
    static ref CALLER_ID_NUM_REGEX: Regex =
        Regex::new(r"^\+?[\dA-Z]+$").expect("caller id number pattern must compile");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId {
    pub name: String,
    pub num: Option<String>,
}

impl CallerId {
    /// Parse the quoted name and the optional angle-bracketed number
    pub fn parse(value: &str) -> Option<CallerId> {
        let captures = CALLER_ID_REGEX.captures(value)?;
        Some(CallerId {
            name: captures.name("name")?.as_str().to_string(),
            num: captures.name("num").map(|m| m.as_str().to_string()),
        })
    }

    pub fn format(&self) -> String {
        match &self.num {
            Some(num) => format!("\"{}\" <{}>", self.name, num),
            None => format!("\"{}\"", self.name),
        }
    }
}

/// Reject names that would not survive a format/parse round trip
pub fn validate_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::input("Caller id name cannot be empty"));
    }
    if name.contains('"') {
        return Err(AppError::input(
            "Caller id name cannot contain double quotes",
        ));
    }
    Ok(())
}

pub fn validate_num(num: &str) -> AppResult<()> {
    if !CALLER_ID_NUM_REGEX.is_match(num) {
        return Err(AppError::input(format!(
            "'{}' is not a valid caller id number",
            num
        )));
    }
    Ok(())
}

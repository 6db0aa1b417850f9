//! Line-oriented prompts on stdin.

use std::fmt;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationChoice {
    Yes,
    No,
}

#[derive(Debug, Clone)]
pub struct PromptError {
    message: String,
}

impl PromptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PromptError {}

impl From<io::Error> for PromptError {
    fn from(err: io::Error) -> Self {
        PromptError::new(err.to_string())
    }
}

/// Print `label`, read one line and strip the line ending. End of input is
/// an error so a closed stdin cannot loop forever.
pub fn prompt_line(label: &str) -> Result<String, PromptError> {
    print!("{label}");
    io::stdout().flush()?;
    read_trimmed_line(&mut io::stdin().lock())
}

pub fn read_trimmed_line<R: BufRead>(reader: &mut R) -> Result<String, PromptError> {
    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        return Err(PromptError::new("No input provided"));
    }
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

pub fn prompt_password(label: &str) -> Result<String, PromptError> {
    let password = prompt_line(label)?;
    if password.is_empty() {
        return Err(PromptError::new("Password cannot be empty"));
    }
    Ok(password)
}

/// Ask twice and require both answers to match.
pub fn prompt_new_password() -> Result<String, PromptError> {
    let first = prompt_password("New password: ")?;
    let second = prompt_password("Repeat new password: ")?;
    if first != second {
        return Err(PromptError::new("Passwords do not match"));
    }
    Ok(first)
}

pub fn parse_confirmation(input: &str) -> Result<ConfirmationChoice, PromptError> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Ok(ConfirmationChoice::No);
    }
    match trimmed.as_str() {
        "y" | "yes" => Ok(ConfirmationChoice::Yes),
        "n" | "no" => Ok(ConfirmationChoice::No),
        _ => Err(PromptError::new("Invalid confirmation response")),
    }
}

pub fn confirm(question: &str) -> Result<bool, PromptError> {
    let answer = prompt_line(&format!("{question} [y/N]: "))?;
    Ok(parse_confirmation(&answer)? == ConfirmationChoice::Yes)
}

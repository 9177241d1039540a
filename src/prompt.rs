//! Operator interaction: the masked password prompt and the one-time code prompt.

use std::io::{self, BufRead, Write};

/// Source of interactive answers during sign-in
pub trait Prompt {
    /// Ask for the account password without echoing it
    fn password(&mut self, username: &str) -> io::Result<String>;

    /// Ask for a second-factor verification code
    fn verification_code(&mut self, message: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct Terminal;

impl Prompt for Terminal {
    fn password(&mut self, username: &str) -> io::Result<String> {
        rpassword::prompt_password(format!("Enter password for {}: ", username))
    }

    fn verification_code(&mut self, message: &str) -> io::Result<String> {
        print!("{}: ", message);
        io::stdout().flush()?;
        read_code(io::stdin().lock())
    }
}

fn read_code(mut input: impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no verification code entered",
        ));
    }
    Ok(line.trim().to_string())
}

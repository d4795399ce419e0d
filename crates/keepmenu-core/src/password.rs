//! Random password generation from named character classes.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

pub const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &str = "0123456789";
pub const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Length offered when the user does not pick one.
pub const DEFAULT_LENGTH: usize = 20;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PasswordError {
    #[error("No characters to generate a password from")]
    NoCharacters,

    #[error("Password length {length} is too short for {classes} character classes")]
    TooShort { length: usize, classes: usize },
}

/// Generate a password of `length` characters.
///
/// Every class in `classes` contributes at least one character. Classes with
/// identical contents are counted once and empty classes are ignored.
pub fn generate(length: usize, classes: &[&str]) -> Result<String, PasswordError> {
    let mut distinct: Vec<Vec<char>> = Vec::new();
    for class in classes {
        let mut chars: Vec<char> = class.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        if !chars.is_empty() && !distinct.contains(&chars) {
            distinct.push(chars);
        }
    }

    if distinct.is_empty() {
        return Err(PasswordError::NoCharacters);
    }
    if length < distinct.len() {
        return Err(PasswordError::TooShort {
            length,
            classes: distinct.len(),
        });
    }

    let mut alphabet: Vec<char> = distinct.iter().flatten().copied().collect();
    alphabet.sort_unstable();
    alphabet.dedup();

    let mut rng = rand::thread_rng();
    let mut password: Vec<char> = Vec::with_capacity(length);
    for class in &distinct {
        password.push(class[rng.gen_range(0..class.len())]);
    }
    while password.len() < length {
        password.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    password.shuffle(&mut rng);

    Ok(password.into_iter().collect())
}

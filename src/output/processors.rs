// src/output/processors.rs

//! Stock output processors.

use regex::Regex;

use super::OutputProcessor;
use crate::errors::{Result, TaskError};

/// Whole stdout as one string, lines joined with `\n`.
#[derive(Debug, Default, Clone)]
pub struct StringOutputProcessor {
    text: String,
}

impl StringOutputProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputProcessor for StringOutputProcessor {
    type Entry = String;
    type Output = String;

    fn receive_line(&mut self, line: &str) -> Option<String> {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line);
        Some(line.to_string())
    }

    fn result(&self) -> String {
        self.text.clone()
    }
}

/// First line only; later lines are rejected.
#[derive(Debug, Default, Clone)]
pub struct FirstLineOutputProcessor {
    first: Option<String>,
}

impl FirstLineOutputProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputProcessor for FirstLineOutputProcessor {
    type Entry = String;
    type Output = Option<String>;

    fn receive_line(&mut self, line: &str) -> Option<String> {
        if self.first.is_some() {
            return None;
        }
        self.first = Some(line.to_string());
        self.first.clone()
    }

    fn result(&self) -> Option<String> {
        self.first.clone()
    }
}

/// Last line wins.
#[derive(Debug, Default, Clone)]
pub struct LastLineOutputProcessor {
    last: Option<String>,
}

impl LastLineOutputProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputProcessor for LastLineOutputProcessor {
    type Entry = String;
    type Output = Option<String>;

    fn receive_line(&mut self, line: &str) -> Option<String> {
        self.last = Some(line.to_string());
        self.last.clone()
    }

    fn result(&self) -> Option<String> {
        self.last.clone()
    }
}

#[derive(Debug, Default, Clone)]
pub struct LineListOutputProcessor {
    lines: Vec<String>,
}

impl LineListOutputProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputProcessor for LineListOutputProcessor {
    type Entry = String;
    type Output = Vec<String>;

    fn receive_line(&mut self, line: &str) -> Option<String> {
        self.lines.push(line.to_string());
        Some(line.to_string())
    }

    fn result(&self) -> Vec<String> {
        self.lines.clone()
    }
}

/// `key=value` lines, as printed by `git config -l` and friends.
///
/// The line is split at the first `=`; lines without one, or starting with
/// one, are rejected. The value may itself contain `=`.
#[derive(Debug, Default, Clone)]
pub struct KeyValueOutputProcessor {
    entries: Vec<(String, String)>,
}

impl KeyValueOutputProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputProcessor for KeyValueOutputProcessor {
    type Entry = (String, String);
    type Output = Vec<(String, String)>;

    fn receive_line(&mut self, line: &str) -> Option<(String, String)> {
        let eq = line.find('=')?;
        if eq == 0 {
            return None;
        }
        let entry = (line[..eq].to_string(), line[eq + 1..].to_string());
        self.entries.push(entry.clone());
        Some(entry)
    }

    fn result(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }
}

/// Lines matching a regex. The entry is capture group 1 when the pattern
/// has one, otherwise the whole match.
#[derive(Debug, Clone)]
pub struct PatternOutputProcessor {
    regex: Regex,
    matches: Vec<String>,
}

impl PatternOutputProcessor {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            TaskError::Configuration(format!("invalid output pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            regex,
            matches: Vec::new(),
        })
    }
}

impl OutputProcessor for PatternOutputProcessor {
    type Entry = String;
    type Output = Vec<String>;

    fn receive_line(&mut self, line: &str) -> Option<String> {
        let caps = self.regex.captures(line)?;
        let found = caps.get(1).or_else(|| caps.get(0))?;
        let entry = found.as_str().to_string();
        self.matches.push(entry.clone());
        Some(entry)
    }

    fn result(&self) -> Vec<String> {
        self.matches.clone()
    }
}

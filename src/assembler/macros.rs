//! Macro definitions.
//!
//! ```text
//! #begin call $1
//!     addi pc 2 ra
//!     jump $1
//! #end
//! ```
//!
//! Placeholders are `$1` to `$n` in order. An invocation is a line whose
//! operation names a macro; its arguments replace the placeholders textually.

use std::collections::HashMap;

use log::*;

use crate::processor::Opcode;
use crate::register::RegisterId;

use super::{ParseError, ParseErrorKind, Result};

const BEGIN_MARKER: &str = "#begin";
const END_MARKER: &str = "#end";

/// A named template of source lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    name: String,
    params: Vec<String>,
    lines: Vec<String>,
}

impl Macro {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Placeholders in order, `$1` first.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the template lines with every placeholder replaced by the
    /// matching argument.
    ///
    /// # Errors
    ///
    /// The number of arguments has to match the number of placeholders.
    pub fn substitute<S: AsRef<str>>(&self, args: &[S], line_nr: usize) -> Result<Vec<String>> {
        if args.len() != self.params.len() {
            return Err(ParseError::new(
                ParseErrorKind::MacroArity,
                format!(
                    "macro `{}` expects {} arguments, given {}",
                    self.name,
                    self.params.len(),
                    args.len()
                ),
                line_nr,
            ));
        }

        // highest placeholder first so `$1` never eats into `$10`
        let lines = self
            .lines
            .iter()
            .map(|line| {
                self.params
                    .iter()
                    .zip(args)
                    .rev()
                    .fold(line.clone(), |line, (param, arg)| {
                        line.replace(param.as_str(), arg.as_ref())
                    })
            })
            .collect();

        Ok(lines)
    }
}

#[derive(Debug, Clone)]
struct OpenMacro {
    name: String,
    params: Vec<String>,
    line_nr: usize,
}

/// Recognizes, stores and looks up macros.
#[derive(Debug, Default)]
pub struct MacroAssembler {
    source_buffer: Vec<String>,
    macros: HashMap<String, Macro>,
    current: Option<OpenMacro>,
}

impl MacroAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a definition is open and lines go into its body.
    pub fn in_macro(&self) -> bool {
        self.current.is_some()
    }

    /// Name and line of the open definition, if any.
    pub fn open_macro(&self) -> Option<(&str, usize)> {
        self.current
            .as_ref()
            .map(|open| (open.name.as_str(), open.line_nr))
    }

    pub fn is_begin_macro(line: &str) -> bool {
        line.split_whitespace().next() == Some(BEGIN_MARKER)
    }

    pub fn is_end_macro(line: &str) -> bool {
        line.trim() == END_MARKER
    }

    /// Opens a definition from a line accepted by
    /// [`MacroAssembler::is_begin_macro`].
    pub fn begin_macro(&mut self, line: &str, line_nr: usize) -> Result<()> {
        if let Some(open) = &self.current {
            return Err(ParseError::new(
                ParseErrorKind::MalformedMacro,
                format!("nested macro inside `{}`", open.name),
                line_nr,
            ));
        }

        let mut tokens = line.split_whitespace().skip(1);
        let name = tokens.next().ok_or_else(|| {
            ParseError::new(ParseErrorKind::MalformedMacro, "macro has no name", line_nr)
        })?;
        validate_name(name, line_nr)?;
        if self.macros.contains_key(name) {
            return Err(ParseError::new(
                ParseErrorKind::MalformedMacro,
                format!("macro `{}` is already defined", name),
                line_nr,
            ));
        }

        let params = tokens
            .enumerate()
            .map(|(i, param)| {
                let valid = param
                    .strip_prefix('$')
                    .and_then(|index| index.parse::<usize>().ok())
                    .map_or(false, |index| index == i + 1);
                if valid {
                    Ok(param.to_string())
                } else {
                    Err(ParseError::new(
                        ParseErrorKind::MalformedMacro,
                        format!(
                            "parameter {} of macro `{}` should be `${}`, found `{}`",
                            i + 1,
                            name,
                            i + 1,
                            param
                        ),
                        line_nr,
                    ))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "[{}] Found macro `{}` with {} parameters",
            line_nr,
            name,
            params.len()
        );

        self.current = Some(OpenMacro {
            name: name.to_string(),
            params,
            line_nr,
        });

        Ok(())
    }

    /// Adds a line to the body of the open definition.
    pub fn add_to_macro_source(&mut self, line: &str) {
        self.source_buffer.push(line.to_string());
    }

    /// Closes the open definition and makes the macro available.
    pub fn end_macro(&mut self, line_nr: usize) -> Result<()> {
        let open = self.current.take().ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::MalformedMacro,
                "end of macro without a definition",
                line_nr,
            )
        })?;

        let lines = std::mem::take(&mut self.source_buffer);
        self.macros.insert(
            open.name.clone(),
            Macro {
                name: open.name,
                params: open.params,
                lines,
            },
        );

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// Forgets every macro and any open definition.
    pub fn clear(&mut self) {
        self.source_buffer.clear();
        self.macros.clear();
        self.current = None;
    }
}

fn validate_name(name: &str, line_nr: usize) -> Result<()> {
    let reason = if name.starts_with('$') || name.ends_with(':') || name.starts_with('#') {
        Some("is not a valid macro name")
    } else if Opcode::from_mnemonic(name).is_some() {
        Some("shadows an instruction")
    } else if RegisterId::from_name(name).is_some() {
        Some("shadows a register")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ParseError::new(
            ParseErrorKind::MalformedMacro,
            format!("`{}` {}", name, reason),
            line_nr,
        )),
        None => Ok(()),
    }
}

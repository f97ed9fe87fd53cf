//! Assembles line oriented source into a [`Program`].
//!
//! ```text
//! // count v0 down to zero
//! #begin dec $1
//!     subi $1 1 $1
//! #end
//!         loadi v0 3
//! loop:   dec v0
//!         bonz v0 loop
//!         exit
//! ```
//!
//! Source is case-insensitive and tokens are separated by whitespace. Branch
//! targets may name labels that are only defined further down; those
//! instructions are completed as soon as the label shows up, and a session
//! that ends with one still waiting fails.

use std::borrow::Cow;
use std::collections::HashMap;
use std::error;
use std::fmt;

use log::*;

use crate::memory::Word;
use crate::processor::{Instruction, Opcode, Program};
use crate::register::RegisterId;

pub mod macros;

pub use macros::{Macro, MacroAssembler};

/// How deep macro invocations may nest before expansion is aborted
pub const MAX_MACRO_DEPTH: usize = 64;

const COMMENT_PREFIX: &str = "//";
const LABEL_SUFFIX: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    InvalidInstruction,
    InvalidRegister,
    InvalidImmediate { radix: u32 },
    InvalidLabel,
    InvalidTarget,
    MissingOperand,
    TrailingOperand,
    UnresolvedLabel,
    MalformedMacro,
    MacroArity,
    MacroRecursion,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidInstruction => f.write_str("failed to resolve instruction"),
            ParseErrorKind::InvalidRegister => f.write_str("invalid register"),
            ParseErrorKind::InvalidImmediate { radix } => {
                write!(f, "failed to parse number with radix `{}`", radix)
            }
            ParseErrorKind::InvalidLabel => f.write_str("invalid label"),
            ParseErrorKind::InvalidTarget => f.write_str("invalid branch target"),
            ParseErrorKind::MissingOperand => f.write_str("missing operand"),
            ParseErrorKind::TrailingOperand => f.write_str("too many operands"),
            ParseErrorKind::UnresolvedLabel => f.write_str("label was never defined"),
            ParseErrorKind::MalformedMacro => f.write_str("malformed macro"),
            ParseErrorKind::MacroArity => f.write_str("wrong number of macro arguments"),
            ParseErrorKind::MacroRecursion => f.write_str("macro expansion nested too deep"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: usize,
}

impl ParseError {
    fn new<C, S>(kind: ParseErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Line within the source fragment the error was found on
    pub fn line_nr(&self) -> usize {
        self.line_nr
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [ln: {}]: {} - {}",
                self.line_nr, self.kind, context
            )
        } else {
            write!(f, "error [ln: {}]: {}", self.line_nr, self.kind)
        }
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Parses a decimal, `0x` hexadecimal, `0b` binary or `0o` octal number with
/// an optional leading `-` or `+`.
///
/// Returns `None` if the token does not look like a number at all and the
/// failing radix if it does but cannot be parsed.
fn parse_number(token: &str) -> Option<Result<Word, u32>> {
    let (negative, digits) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };

    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        // a sign commits the token to being a number
        return if digits.len() < token.len() {
            Some(Err(10))
        } else {
            None
        };
    }

    let (radix, offset) = match digits.as_bytes() {
        [b'0', b'b', ..] => (2, 2),
        [b'0', b'o', ..] => (8, 2),
        [b'0', b'x', ..] => (16, 2),
        _ => (10, 0),
    };

    let digits = &digits[offset..];
    if digits.starts_with(|c: char| c == '+' || c == '-') {
        return Some(Err(radix));
    }

    let magnitude = match i64::from_str_radix(digits, radix) {
        Ok(magnitude) => magnitude,
        Err(_) => return Some(Err(radix)),
    };
    let value = if negative { -magnitude } else { magnitude };

    if value < Word::MIN as i64 || value > Word::MAX as i64 {
        return Some(Err(radix));
    }

    Some(Ok(value as Word))
}

/// A branch or jump whose target label has not been defined yet. Everything
/// but the target is already parsed.
#[derive(Debug, Clone, Copy)]
enum BranchPatch {
    Jump,
    Register(fn(RegisterId, Word) -> Instruction, RegisterId),
    TwoRegisters(
        fn(RegisterId, RegisterId, Word) -> Instruction,
        RegisterId,
        RegisterId,
    ),
}

impl BranchPatch {
    fn complete(self, target: Word) -> Instruction {
        match self {
            BranchPatch::Jump => Instruction::jump(target),
            BranchPatch::Register(build, a) => build(a, target),
            BranchPatch::TwoRegisters(build, a, b) => build(a, b, target),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Ready(Instruction),
    Waiting { patch: BranchPatch, label: String },
}

#[derive(Debug, Clone)]
struct ParsedInstruction {
    line_nr: usize,
    slot: Slot,
}

enum Target {
    Index(Word),
    Label(String),
}

/// Reads the operands of one instruction line in order.
struct OperandReader<'a> {
    tokens: std::slice::Iter<'a, &'a str>,
    line_nr: usize,
}

impl<'a> OperandReader<'a> {
    fn new(tokens: &'a [&'a str], line_nr: usize) -> Self {
        Self {
            tokens: tokens.iter(),
            line_nr,
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<&'a str> {
        self.tokens.next().copied().ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::MissingOperand,
                format!("expected {}", expected),
                self.line_nr,
            )
        })
    }

    fn register(&mut self) -> Result<RegisterId> {
        let token = self.next("a register")?;
        RegisterId::from_name(token).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::InvalidRegister,
                format!("unrecognized register `{}`", token),
                self.line_nr,
            )
        })
    }

    fn immediate(&mut self) -> Result<Word> {
        let token = self.next("an immediate value")?;
        match parse_number(token) {
            Some(Ok(value)) => Ok(value),
            Some(Err(radix)) => Err(ParseError::new(
                ParseErrorKind::InvalidImmediate { radix },
                format!("invalid immediate value `{}`", token),
                self.line_nr,
            )),
            None => Err(ParseError::new(
                ParseErrorKind::InvalidImmediate { radix: 10 },
                format!("invalid immediate value `{}`", token),
                self.line_nr,
            )),
        }
    }

    fn target(&mut self, labels: &HashMap<String, usize>) -> Result<Target> {
        let token = self.next("a branch target")?;

        if RegisterId::from_name(token).is_some() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidTarget,
                format!("register `{}` cannot be a branch target", token),
                self.line_nr,
            ));
        }

        match parse_number(token) {
            Some(Ok(index)) => Ok(Target::Index(index)),
            Some(Err(radix)) => Err(ParseError::new(
                ParseErrorKind::InvalidImmediate { radix },
                format!("invalid instruction number `{}`", token),
                self.line_nr,
            )),
            None => Ok(match labels.get(token) {
                Some(index) => Target::Index(*index as Word),
                None => Target::Label(token.to_string()),
            }),
        }
    }

    fn finish(mut self) -> Result<()> {
        match self.tokens.next() {
            Some(token) => Err(ParseError::new(
                ParseErrorKind::TrailingOperand,
                format!("unexpected `{}`", token),
                self.line_nr,
            )),
            None => Ok(()),
        }
    }
}

fn parse_label(token: &str, line_nr: usize) -> Result<&str> {
    let label = token.strip_suffix(LABEL_SUFFIX).unwrap_or(token);

    let invalid = label.is_empty()
        || label.contains(LABEL_SUFFIX)
        || label.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+')
        || RegisterId::from_name(label).is_some();

    if invalid {
        return Err(ParseError::new(
            ParseErrorKind::InvalidLabel,
            format!("`{}` is not a valid label identifier", token),
            line_nr,
        ));
    }

    Ok(label)
}

/// Turns source text into programs.
///
/// The assembler is stateful only for the duration of one [`Session`]:
/// labels, pending references and macros are forgotten when the next session
/// begins.
#[derive(Debug, Default)]
pub struct Assembler {
    labels: HashMap<String, usize>,
    macros: MacroAssembler,
    pending: HashMap<String, Vec<usize>>,
    parsed: Vec<ParsedInstruction>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new build session, discarding everything from the previous
    /// one.
    pub fn begin(&mut self) -> Session<'_> {
        self.labels.clear();
        self.macros.clear();
        self.pending.clear();
        self.parsed.clear();

        Session {
            assembler: self,
            failed: None,
        }
    }

    /// Assembles a single source fragment into a program.
    pub fn assemble(&mut self, source: &str) -> Result<Program> {
        let mut session = self.begin();
        session.assemble(source)?;
        session.end()
    }

    /// Index of a label defined in the current or last session.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(&name.to_lowercase()).copied()
    }

    fn parse_line(&mut self, line: &str, line_nr: usize, depth: usize) -> Result<()> {
        let line = line.trim().to_lowercase();

        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            // Comment or empty line; skip
            Ok(())
        } else if MacroAssembler::is_begin_macro(&line) {
            self.macros.begin_macro(&line, line_nr)
        } else if MacroAssembler::is_end_macro(&line) {
            self.macros.end_macro(line_nr)
        } else if self.macros.in_macro() {
            self.macros.add_to_macro_source(&line);
            Ok(())
        } else {
            self.parse_instruction(&line, line_nr, depth)
        }
    }

    /// Tries to parse a line as an instruction or macro invocation with an
    /// optional leading label.
    ///
    /// # Examples
    ///
    /// - `addi v0 1 v0`
    /// - `loop: bolt v0 v1 loop`
    /// - `end:`
    fn parse_instruction(&mut self, line: &str, line_nr: usize, depth: usize) -> Result<()> {
        let tokens = line.split_whitespace().collect::<Vec<_>>();

        let rest = match tokens.split_first() {
            Some((first, rest)) if first.ends_with(LABEL_SUFFIX) => {
                let label = parse_label(first, line_nr)?;
                self.define_label(label, line_nr);
                rest
            }
            _ => &tokens[..],
        };

        let (op, args) = match rest.split_first() {
            Some(split) => split,
            None => {
                // A label on its own line marks a no-op
                self.push(Instruction::noop(), line_nr);
                return Ok(());
            }
        };

        let expansion = match self.macros.get(op) {
            Some(mac) => Some((mac.name().to_string(), mac.substitute(args, line_nr)?)),
            None => None,
        };
        if let Some((name, lines)) = expansion {
            return self.expand_macro(&name, &lines, line_nr, depth);
        }

        let opcode = Opcode::from_mnemonic(op).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::InvalidInstruction,
                format!("no instruction or macro named `{}`", op),
                line_nr,
            )
        })?;

        debug!("[{}] Found instruction {}", line_nr, opcode);

        let mut reader = OperandReader::new(args, line_nr);
        let slot = self.parse_operands(opcode, &mut reader)?;
        reader.finish()?;

        let index = self.parsed.len();
        if let Slot::Waiting { label, .. } = &slot {
            debug!("[{}] Waiting for label `{}`", line_nr, label);
            self.pending.entry(label.clone()).or_default().push(index);
        }
        self.parsed.push(ParsedInstruction { line_nr, slot });

        Ok(())
    }

    fn parse_operands(&self, opcode: Opcode, ops: &mut OperandReader<'_>) -> Result<Slot> {
        use Opcode::*;

        let instruction = match opcode {
            Invalid => Instruction::invalid(),
            NoOp => Instruction::noop(),
            Exit => Instruction::exit(),
            Print => Instruction::print(ops.register()?),

            Add => Instruction::add(ops.register()?, ops.register()?, ops.register()?),
            Sub => Instruction::sub(ops.register()?, ops.register()?, ops.register()?),
            Mul => Instruction::mul(ops.register()?, ops.register()?, ops.register()?),
            Div => Instruction::div(ops.register()?, ops.register()?, ops.register()?),
            LeftShift => Instruction::left_shift(ops.register()?, ops.register()?, ops.register()?),
            RightShift => {
                Instruction::right_shift(ops.register()?, ops.register()?, ops.register()?)
            }
            Equal => Instruction::equal(ops.register()?, ops.register()?, ops.register()?),

            AddI => Instruction::add_i(ops.register()?, ops.immediate()?, ops.register()?),
            SubI => Instruction::sub_i(ops.register()?, ops.immediate()?, ops.register()?),
            MulI => Instruction::mul_i(ops.register()?, ops.immediate()?, ops.register()?),
            DivI => Instruction::div_i(ops.register()?, ops.immediate()?, ops.register()?),
            LeftShiftI => {
                Instruction::left_shift_i(ops.register()?, ops.immediate()?, ops.register()?)
            }
            RightShiftI => {
                Instruction::right_shift_i(ops.register()?, ops.immediate()?, ops.register()?)
            }

            LoadI => Instruction::load_i(ops.register()?, ops.immediate()?),
            LoadMem => Instruction::load_mem(ops.register()?, ops.immediate()?),
            LoadReg => Instruction::load_reg(ops.register()?, ops.register()?),
            Move => Instruction::move_reg(ops.register()?, ops.register()?),
            StoreMem => Instruction::store_mem(ops.register()?, ops.immediate()?),
            StoreReg => Instruction::store_reg(ops.register()?, ops.register()?),
            Push => Instruction::push(ops.register()?),
            Pop => Instruction::pop(ops.register()?),

            JumpRegister => Instruction::jump_register(ops.register()?),
            Jump => return self.branch(BranchPatch::Jump, ops),
            BranchOnZero => {
                let patch = BranchPatch::Register(Instruction::branch_on_zero, ops.register()?);
                return self.branch(patch, ops);
            }
            BranchOnNotZero => {
                let patch = BranchPatch::Register(Instruction::branch_on_not_zero, ops.register()?);
                return self.branch(patch, ops);
            }
            BranchOnEqual
            | BranchOnNotEqual
            | BranchOnLessThan
            | BranchOnGreaterThan
            | BranchOnLessThanOrEqual
            | BranchOnGreaterThanOrEqual => {
                let build: fn(RegisterId, RegisterId, Word) -> Instruction = match opcode {
                    BranchOnEqual => Instruction::branch_on_equal,
                    BranchOnNotEqual => Instruction::branch_on_not_equal,
                    BranchOnLessThan => Instruction::branch_on_less_than,
                    BranchOnGreaterThan => Instruction::branch_on_greater_than,
                    BranchOnLessThanOrEqual => Instruction::branch_on_less_than_or_equal,
                    _ => Instruction::branch_on_greater_than_or_equal,
                };
                let patch = BranchPatch::TwoRegisters(build, ops.register()?, ops.register()?);
                return self.branch(patch, ops);
            }
        };

        Ok(Slot::Ready(instruction))
    }

    fn branch(&self, patch: BranchPatch, ops: &mut OperandReader<'_>) -> Result<Slot> {
        Ok(match ops.target(&self.labels)? {
            Target::Index(target) => Slot::Ready(patch.complete(target)),
            Target::Label(label) => Slot::Waiting { patch, label },
        })
    }

    fn expand_macro(
        &mut self,
        name: &str,
        lines: &[String],
        line_nr: usize,
        depth: usize,
    ) -> Result<()> {
        if depth >= MAX_MACRO_DEPTH {
            return Err(ParseError::new(
                ParseErrorKind::MacroRecursion,
                format!("expanding `{}` exceeded {} nested macros", name, MAX_MACRO_DEPTH),
                line_nr,
            ));
        }

        debug!("[{}] Expanding macro `{}`", line_nr, name);

        for line in lines {
            self.parse_line(line, line_nr, depth + 1)?;
        }

        Ok(())
    }

    /// Binds `label` to the index the next instruction will occupy and
    /// completes every instruction waiting for it. The first binding wins.
    fn define_label(&mut self, label: &str, line_nr: usize) {
        if let Some(index) = self.labels.get(label) {
            warn!(
                "[{}] Label `{}` is already bound to instruction {}; ignoring",
                line_nr, label, index
            );
            return;
        }

        let index = self.parsed.len();
        debug!("[{}] Label `{}` at instruction {}", line_nr, label, index);
        self.labels.insert(label.to_string(), index);

        for slot in self.pending.remove(label).unwrap_or_default() {
            let parsed = &mut self.parsed[slot];
            if let Slot::Waiting { patch, .. } = parsed.slot {
                parsed.slot = Slot::Ready(patch.complete(index as Word));
            }
        }
    }

    fn push(&mut self, instruction: Instruction, line_nr: usize) {
        self.parsed.push(ParsedInstruction {
            line_nr,
            slot: Slot::Ready(instruction),
        });
    }
}

/// One build: any number of source fragments assembled into a single
/// program.
#[derive(Debug)]
pub struct Session<'a> {
    assembler: &'a mut Assembler,
    failed: Option<ParseError>,
}

impl<'a> Session<'a> {
    /// Parses a source fragment. Lines are numbered from 1 within the
    /// fragment.
    ///
    /// # Errors
    ///
    /// Stops at the first malformed line. The session is unusable afterwards
    /// and [`Session::end`] reports the same error.
    pub fn assemble(&mut self, source: &str) -> Result<()> {
        self.assemble_lines(source.lines())
    }

    /// Like [`Session::assemble`] for a fragment that is already split into
    /// lines.
    pub fn assemble_lines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        for (i, line) in lines.into_iter().enumerate() {
            let line_nr = i + 1;
            if let Err(err) = self.assembler.parse_line(line.as_ref(), line_nr, 0) {
                error!("{}", err);
                self.failed = Some(err.clone());
                return Err(err);
            }
        }

        Ok(())
    }

    /// Finishes the session and returns the program.
    ///
    /// # Errors
    ///
    /// Fails if a macro definition is still open or an instruction still
    /// waits for a label that was never defined.
    pub fn end(self) -> Result<Program> {
        if let Some(err) = self.failed {
            return Err(err);
        }

        if let Some((name, line_nr)) = self.assembler.macros.open_macro() {
            return Err(ParseError::new(
                ParseErrorKind::MalformedMacro,
                format!("macro `{}` is never closed", name),
                line_nr,
            ));
        }

        let parsed = std::mem::take(&mut self.assembler.parsed);
        let mut instructions = Vec::with_capacity(parsed.len());
        for ParsedInstruction { line_nr, slot } in parsed {
            match slot {
                Slot::Ready(instruction) => instructions.push(instruction),
                Slot::Waiting { label, .. } => {
                    let err = ParseError::new(
                        ParseErrorKind::UnresolvedLabel,
                        format!("could not find an instruction for the label `{}`", label),
                        line_nr,
                    );
                    error!("{}", err);
                    return Err(err);
                }
            }
        }
        self.assembler.pending.clear();

        debug!("Assembled {} instructions", instructions.len());

        Ok(Program::new(instructions))
    }
}

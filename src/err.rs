//! Numbered runtime errors and the reporting policy.
//!
//! Codes 1..18 are fatal; 19..32 are the soft "called with object 0"
//! family. Soft errors keep per-code counters and may print a warning into
//! the story's own text stream, depending on the configured report mode.

/// Runtime error codes, numbered per the long-standing interpreter convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    TextBufOvf = 1,
    StoreRange = 2,
    DivZero = 3,
    IllObj = 4,
    IllAttr = 5,
    NoProp = 6,
    StkOvf = 7,
    IllCallAddr = 8,
    CallNonRtn = 9,
    StkUndf = 10,
    IllOpcode = 11,
    BadFrame = 12,
    IllJumpAddr = 13,
    SaveInInter = 14,
    Str3Nesting = 15,
    IllWin = 16,
    IllWinProp = 17,
    IllPrintAddr = 18,
    Jin0 = 19,
    GetChild0 = 20,
    GetParent0 = 21,
    GetSibling0 = 22,
    GetPropAddr0 = 23,
    GetProp0 = 24,
    PutProp0 = 25,
    ClearAttr0 = 26,
    SetAttr0 = 27,
    TestAttr0 = 28,
    MoveObject0 = 29,
    MoveObjectTo0 = 30,
    RemoveObject0 = 31,
    GetNextProp0 = 32,
}

pub const NUM_ERRORS: usize = 32;
pub const MAX_FATAL: u8 = 18;

impl ErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_fatal(self) -> bool {
        self.code() <= MAX_FATAL
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::TextBufOvf => "Text buffer overflow",
            ErrorCode::StoreRange => "Store out of dynamic memory",
            ErrorCode::DivZero => "Division by zero",
            ErrorCode::IllObj => "Illegal object",
            ErrorCode::IllAttr => "Illegal attribute",
            ErrorCode::NoProp => "No such property",
            ErrorCode::StkOvf => "Stack overflow",
            ErrorCode::IllCallAddr => "Call to illegal address",
            ErrorCode::CallNonRtn => "Call to non-routine",
            ErrorCode::StkUndf => "Stack underflow",
            ErrorCode::IllOpcode => "Illegal opcode",
            ErrorCode::BadFrame => "Bad stack frame",
            ErrorCode::IllJumpAddr => "Jump to illegal address",
            ErrorCode::SaveInInter => "Can't save while in interrupt",
            ErrorCode::Str3Nesting => "Nesting stream #3 too deep",
            ErrorCode::IllWin => "Illegal window",
            ErrorCode::IllWinProp => "Illegal window property",
            ErrorCode::IllPrintAddr => "Print at illegal address",
            ErrorCode::Jin0 => "@jin called with object 0",
            ErrorCode::GetChild0 => "@get_child called with object 0",
            ErrorCode::GetParent0 => "@get_parent called with object 0",
            ErrorCode::GetSibling0 => "@get_sibling called with object 0",
            ErrorCode::GetPropAddr0 => "@get_prop_addr called with object 0",
            ErrorCode::GetProp0 => "@get_prop called with object 0",
            ErrorCode::PutProp0 => "@put_prop called with object 0",
            ErrorCode::ClearAttr0 => "@clear_attr called with object 0",
            ErrorCode::SetAttr0 => "@set_attr called with object 0",
            ErrorCode::TestAttr0 => "@test_attr called with object 0",
            ErrorCode::MoveObject0 => "@move_object called moving object 0",
            ErrorCode::MoveObjectTo0 => "@move_object called moving into object 0",
            ErrorCode::RemoveObject0 => "@remove_object called with object 0",
            ErrorCode::GetNextProp0 => "@get_next_prop called with object 0",
        }
    }
}

/// How runtime errors are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Never,
    Once,
    Always,
    Fatal,
}

impl Default for ReportMode {
    fn default() -> Self {
        ReportMode::Never
    }
}

/// What the caller should do after recording an error.
#[derive(Debug, PartialEq)]
pub enum ErrorAction {
    /// Terminate via the presenter's fatal path with this message
    Fatal(&'static str),
    /// Print a warning into the active streams, then continue
    Warn { message: String },
    /// Continue silently
    Continue,
}

/// Per-code occurrence counters plus the report mode.
pub struct ErrorLog {
    counts: [u32; NUM_ERRORS],
    pub mode: ReportMode,
}

impl ErrorLog {
    pub fn new(mode: ReportMode) -> Self {
        ErrorLog {
            counts: [0; NUM_ERRORS],
            mode,
        }
    }

    pub fn occurrences(&self, code: ErrorCode) -> u32 {
        self.counts[code.code() as usize - 1]
    }

    /// Record one occurrence and decide how to surface it. `pc` is the
    /// address of the offending instruction, quoted in the warning text.
    pub fn record(&mut self, code: ErrorCode, pc: u32) -> ErrorAction {
        if self.mode == ReportMode::Fatal || code.is_fatal() {
            return ErrorAction::Fatal(code.message());
        }

        let slot = code.code() as usize - 1;
        let was_first = self.counts[slot] == 0;
        self.counts[slot] += 1;

        match self.mode {
            ReportMode::Always => ErrorAction::Warn {
                message: format!(
                    "Warning: {} (PC = {:x}) (occurence {})",
                    code.message(),
                    pc,
                    self.counts[slot]
                ),
            },
            ReportMode::Once if was_first => ErrorAction::Warn {
                message: format!(
                    "Warning: {} (PC = {:x}) (will ignore further occurrences)",
                    code.message(),
                    pc
                ),
            },
            _ => ErrorAction::Continue,
        }
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        ErrorLog::new(ReportMode::default())
    }
}

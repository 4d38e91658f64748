use crate::position::{Code, Position};
use std::fmt::{Debug, Display, Formatter};

/// Graduated debug verbosity, ordered cheapest-to-loudest. `None` emits
/// nothing; each step up includes everything the step below it would print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trace<T = &'static str> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}

impl<T: Display> Display for Trace<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Trace::None => Ok(()),
            Trace::Default(s) | Trace::Success(s) | Trace::Result(s) | Trace::Verbose(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl<T> Trace<T> {
    pub fn order(&self) -> u8 {
        match self {
            Trace::None => 0,
            Trace::Default(_) => 1,
            Trace::Success(_) => 2,
            Trace::Result(_) => 3,
            Trace::Verbose(_) => 4,
        }
    }

    pub fn at_least(&self, other: Trace<()>) -> bool {
        self.order() >= other.order()
    }
}

impl<T: Display + Copy> Trace<T> {
    /// Print a one-line trace of a lexer/parser step reaching `pointer`,
    /// gated behind `debug_assertions` and the configured verbosity.
    #[cfg(debug_assertions)]
    pub fn step(&self, level: Trace<()>, code: &Code, pointer: usize, what: impl Debug) {
        if self.at_least(level) {
            println!("[{}] {:?} @ {}", self, what, code.position_at(pointer));
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn step(&self, _level: Trace<()>, _code: &Code, _pointer: usize, _what: impl Debug) {}

    #[cfg(debug_assertions)]
    pub fn line(&self, level: Trace<()>, message: impl Display) {
        if self.at_least(level) {
            println!("[{}] {}", self, message);
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn line(&self, _level: Trace<()>, _message: impl Display) {}
}

pub fn fmt_position(p: Position) -> String {
    format!("{}", p)
}

//! Tests for the code generator
//!
//! Generation is checked on the emitted text; parse failures on the
//! reported template position.

use super::*;

mod helpers;

mod directives;
mod parse_errors;

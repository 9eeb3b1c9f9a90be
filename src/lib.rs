//! Line Patcher: line-number-anchored text patching for LLM edit tools
//!
//! An agent reads a file as numbered lines (`[01]fn main() {`), then submits
//! a batch of edit directives that refer to those numbers together with the
//! line count it saw. The batch is parsed, validated against the current
//! content as a whole, and applied atomically: either every directive lands
//! or nothing does.
//!
//! # Architecture
//!
//! - [`lines`]: numbering, stripping and counting lines
//! - [`directive`]: tag-delimited directive text to [`EditDirective`]s
//! - [`validate`]: staleness, bounds and overlap checks
//! - [`apply`]: the structured working buffer
//! - [`engine`]: the pure pipeline and its error taxonomy
//! - [`dispatch`]: files, locks, write-back and the JSON tool surface
//!
//! # Example
//!
//! ```
//! use line_patcher::patch;
//!
//! let current = "fn main() {\n    old();\n}\n";
//! let directives = "<edit>\
//!     <start_line>2</start_line><end_line>2</end_line>\
//!     <new_content>    new();</new_content>\
//! </edit>";
//!
//! let result = patch(current, 3, directives).unwrap();
//! assert_eq!(result.final_content, "fn main() {\n    new();\n}\n");
//! ```

pub mod apply;
pub mod config;
pub mod directive;
pub mod dispatch;
pub mod edit;
pub mod engine;
pub mod lines;
pub mod safety;
pub mod validate;

pub use config::{Config, ConfigError};
pub use directive::{parse_batch, parse_directives, Dialect, ParseError};
pub use dispatch::{DispatchError, Dispatcher, EditOutcome, FileView, ToolResponse};
pub use edit::{atomic_write, fingerprint, EditBatch, EditDirective, PatchResult, Position};
pub use engine::{patch, EngineOptions, ErrorKind, PatchEngine, PatchError};
pub use lines::{
    add_line_numbers, count_lines, fragment, strip_line_numbers, LineEnding, LineIndexedText,
};
pub use safety::{SafetyError, WorkspaceGuard};
pub use validate::ValidationError;

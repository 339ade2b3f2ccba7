//! The engine: cell storage, dependency tracking, topological ordering, and
//! parallel recalculation over a [`gridflow_parse::FormulaToken`] stream.
//!
//! [`workbook::Workbook`] is the facade a host embeds against; the other
//! modules are its internal collaborators, exposed for callers that want to
//! assemble their own pipeline (a custom scheduler, an out-of-process
//! snapshot, ...).

pub mod cell;
pub mod config;
pub mod functions;
pub mod interpret;
pub mod iter;
pub mod named;
pub mod pool;
pub mod queue;
pub mod sort;
pub mod store;
pub mod tracker;
pub mod workbook;

pub use config::EngineConfig;
pub use iter::{AddressIterator, ModelCell, ModelIterator};
pub use store::CellType;
pub use workbook::{CellAccess, Workbook};

pub use gridflow_common::{AbsAddress, AbsRange, Address, CellValue, Coord, EngineError, FormulaError, FormulaErrorKind, ListenerError, SheetId};

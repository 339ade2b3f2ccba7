pub mod address;
pub mod error;
pub mod value;

pub use address::{AbsAddress, AbsRange, Address, Coord, SheetId};
pub use error::{EngineError, FormulaError, FormulaErrorKind, ListenerError};
pub use value::CellValue;

pub mod error;
pub mod record;
pub mod value;

pub use error::{DashboardError, ErrorKind, ErrorReport, FieldErrors, Result};
pub use record::{DenormalizedRecord, Record, records_from_value};
pub use value::{RecordKey, lookup_in_map, lookup_path, loose_eq, normalize_key, path_segments};

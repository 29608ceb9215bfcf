pub mod columns;
pub mod projection;

pub use columns::{excel_col_to_index, Field, FieldPositions, NamedView};
pub use projection::{ProjectionField, ProjectionSchema, CRM_INBOX, ENRICHMENT};

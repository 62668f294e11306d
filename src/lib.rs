// FMR Reconcile - Core Library
// Reconciles yearly Fair Market Rent releases with the consumer price index
// and runs the lag and anomaly analyses over the merged series

pub mod error;
pub mod records;
pub mod parser;         // Schema normalizer: year → column layout
pub mod deduplication;  // Multi-county zip codes → one row
pub mod corpus;         // Stacked and joined multi-year corpora
pub mod metro;          // Zip → HUD area code mapping
pub mod temporal;       // CPI re-binning and rent alignment
pub mod lag;
pub mod anomaly;
pub mod source;         // CSV loading (edge glue)
pub mod config;
pub mod bls;
pub mod hud;
pub mod selection;

// Re-export commonly used types
pub use error::{FmrError, Result};
pub use records::{AnalysisField, RawTable, RentField, RentRecord, RentSizes};
pub use parser::{
    anchor_date, detect_layout, extract_year, normalize,
    Layout, NormalizedRow, NormalizedTable,
};
pub use deduplication::{DeduplicationEngine, RoundingPolicy};
pub use corpus::{CorpusAssembler, JoinPolicy, JoinedCorpus, JoinedRow};
pub use metro::{metro_codes, within_metro, MetroCodeMapper};
pub use temporal::{
    drill_down, smooth_and_merge, transform_cpi_data,
    AlignedRow, CpiMatrix, CpiObservation, CpiSeries,
};
pub use lag::{LagCorrelator, LagOutcome, LagTable};
pub use anomaly::{AnomalyReport, AnomalyRow, AnomalyScorer, PeriodBand};
pub use source::{read_cpi_matrix, read_metro_rents, read_raw_table, read_source_dir, SourceTable};
pub use config::PipelineConfig;
pub use selection::{CannedSelector, PromptSelector, Selector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

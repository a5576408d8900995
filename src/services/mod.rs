pub mod audit;
pub mod dataset;
pub mod filters;
pub mod loan_cycles;
pub mod rendering;
pub mod reports;
pub mod rollups;
pub mod taxonomy;

pub mod analyzer;
pub mod batch;
pub mod config;
pub mod error;
pub mod parser;
pub mod supabase;
pub mod utility;
pub mod validation;

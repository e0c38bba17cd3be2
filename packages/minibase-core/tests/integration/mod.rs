//! Integration suite: indexes, queries and the database facade working
//! against real table files.

pub mod end_to_end_tests;
pub mod helpers;
pub mod index_tests;
pub mod query_tests;

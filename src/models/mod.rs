//! API data models
//!
//! Wire structures for the OpenAI API.

pub mod openai;

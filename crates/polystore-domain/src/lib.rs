// Operations
mod operations;
pub use operations::*;

// Errors
mod errors;
pub use errors::*;

// Models
mod records;
pub use records::*;

mod schema;
pub use schema::*;

mod results;
pub use results::*;

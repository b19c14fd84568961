/// Outcome of an insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertResult {
    pub inserted: u64,
    /// Identifiers assigned by the backend, empty where it assigns none
    pub ids: Vec<String>,
}

/// Outcome of an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: u64,
}

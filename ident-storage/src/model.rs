use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct List<T> {
    pub data: Vec<T>,
    pub limit: u64,
    pub offset: u64,
    pub total: i64,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            limit: 0,
            offset: 0,
            total: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Deepest column nesting (lists of lists, dictionaries of lists, ...)
    /// accepted before the conversion fails
    pub max_nesting_depth: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
        }
    }
}

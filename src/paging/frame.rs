//! Frame table: one entry per physical frame, owned by at most one page
//! id at a time.

#[derive(Debug, Clone, Copy, Default)]
pub struct Frame {
    pub page_id: Option<u64>,
    pub occupied: bool,
}

impl Frame {
    pub const fn empty() -> Self {
        Self {
            page_id: None,
            occupied: false,
        }
    }
}

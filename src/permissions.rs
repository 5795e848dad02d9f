/// Answers whether a caller administers a voting system.
///
/// Authentication lives outside this crate; whatever resolves the caller
/// implements this trait.
pub trait Identity {
    fn is_admin_for(&self, system_id: &str) -> bool;
}

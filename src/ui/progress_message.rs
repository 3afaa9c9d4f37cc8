use crate::progress::ImportProgress;

/// Messages from the import observer to the progress thread
#[derive(Clone, Debug)]
pub enum ProgressMessage {
    Progress(ImportProgress),
    /// Ctrl-C seen; the import stops at its next checkpoint
    Aborting,
    Exit,
}

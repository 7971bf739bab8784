pub mod cache;
pub mod entry;
pub mod reload;

pub use cache::{ExpsLoadMode, MacroDependentOutcome, SaveOutcome, ScriptFileCache};
pub use entry::{
    ExpsText, MapPair, ScriptFile, ScriptFileFlags, SourceMarks, SourceView, SsbsText,
};
pub use reload::ReloadCoordinator;

#[cfg(test)]
pub(crate) mod testing;

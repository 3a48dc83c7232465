use crate::config::OutputConfig;
use crate::queue::WorkItem;

/// Maps a work item to the name of its output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputNaming {
    /// `<stem>.<extension>`, one artifact per input.
    PerItem { extension: String },
    /// One fixed name shared by all items.
    Singleton { filename: String },
}

impl OutputNaming {
    pub fn from_config(output: &OutputConfig) -> Self {
        match output {
            OutputConfig::PerItem { extension } => OutputNaming::PerItem {
                extension: extension.clone(),
            },
            OutputConfig::Singleton { filename, .. } => OutputNaming::Singleton {
                filename: filename.clone(),
            },
        }
    }

    pub fn output_name(&self, item: &WorkItem) -> String {
        match self {
            OutputNaming::PerItem { extension } => format!("{}.{}", item.stem(), extension),
            OutputNaming::Singleton { filename } => filename.clone(),
        }
    }

    /// Whether an existing output proves this particular item is done.
    pub fn output_marks_completion(&self) -> bool {
        matches!(self, OutputNaming::PerItem { .. })
    }
}

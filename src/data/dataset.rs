use burn::data::dataset::Dataset;
use std::sync::Arc;

use crate::domain::document::TokenizedDocument;

/// Vectorised reviews, served to Burn's DataLoader one document at a time.
///
/// Clones share the documents, so a fresh loader can be built every epoch.
#[derive(Clone, Debug)]
pub struct ReviewDataset {
    documents: Arc<[TokenizedDocument]>,
}

impl ReviewDataset {
    pub fn new(documents: Vec<TokenizedDocument>) -> Self { Self { documents: documents.into() } }

    pub fn document_count(&self) -> usize { self.documents.len() }

    /// Class ids in document order, read without cloning documents.
    pub fn labels(&self) -> impl Iterator<Item = usize> + '_ {
        self.documents.iter().map(|d| d.label)
    }
}

impl Dataset<TokenizedDocument> for ReviewDataset {
    fn get(&self, index: usize) -> Option<TokenizedDocument> {
        self.documents.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.documents.len()
    }
}

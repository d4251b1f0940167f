//! Citation map aggregation
//!
//! Collapses the raw edge list of a case into a per-destination view:
//! for every cited document, who cites it and with which literal texts.
//! Pure function over already-loaded rows; one pass over the edges.

use crate::db::models::{Citation, Document};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// One citing document within a map entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitingDocument {
    pub document: Document,

    /// Literal citing texts, in edge order, duplicates kept
    pub citation_texts: Vec<String>,
}

/// All citers of one destination document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationMapEntry {
    pub document: Document,
    pub cited_by: Vec<CitingDocument>,
}

#[derive(Default)]
struct DestinationGroup {
    source_order: Vec<Uuid>,
    texts_by_source: HashMap<Uuid, Vec<String>>,
}

/// Build the citation map for a case
///
/// Entries carry the full document rows, so consumers render the map from
/// one response. Entries appear in first-occurrence order of the
/// destination across the edge list, and citers within an entry in
/// first-occurrence order of the source. Edges referencing a document
/// outside the given roster are dropped; a roster document nobody cites
/// yields no entry.
pub fn build_citation_map(documents: &[Document], citations: &[Citation]) -> Vec<CitationMapEntry> {
    let roster: HashMap<Uuid, &Document> = documents.iter().map(|d| (d.id, d)).collect();

    let mut destination_order: Vec<Uuid> = Vec::new();
    let mut groups: HashMap<Uuid, DestinationGroup> = HashMap::new();

    for citation in citations {
        let source = citation.source_document_id;
        let destination = citation.destination_document_id;
        if !roster.contains_key(&source) || !roster.contains_key(&destination) {
            debug!(
                citation_id = %citation.id,
                "Dropping citation edge outside the document roster"
            );
            continue;
        }

        let group = groups.entry(destination).or_insert_with(|| {
            destination_order.push(destination);
            DestinationGroup::default()
        });
        if !group.texts_by_source.contains_key(&source) {
            group.source_order.push(source);
        }
        group
            .texts_by_source
            .entry(source)
            .or_default()
            .push(citation.source_text.clone());
    }

    destination_order
        .into_iter()
        .filter_map(|destination| {
            let document = (*roster.get(&destination)?).clone();
            let DestinationGroup {
                source_order,
                mut texts_by_source,
            } = groups.remove(&destination).unwrap_or_default();
            let cited_by = source_order
                .into_iter()
                .filter_map(|source| {
                    Some(CitingDocument {
                        document: (*roster.get(&source)?).clone(),
                        citation_texts: texts_by_source.remove(&source).unwrap_or_default(),
                    })
                })
                .collect();
            Some(CitationMapEntry { document, cited_by })
        })
        .collect()
}

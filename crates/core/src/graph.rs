use crate::traits::GraphStore;
use crate::{
    ExtractedDocument, GraphError, GraphNode, NodeLabel, RelationKind, Relationship,
};
use tracing::{debug, warn};

/// Which upserts a record produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub documents: usize,
    pub senders: usize,
    pub companies: usize,
    pub skipped: usize,
}

impl LoadSummary {
    pub fn absorb(&mut self, other: LoadSummary) {
        self.documents += other.documents;
        self.senders += other.senders;
        self.companies += other.companies;
        self.skipped += other.skipped;
    }
}

/// Upserts documents, their senders and companies. Every operation is a
/// merge keyed by name, so loading the same record again changes nothing.
pub struct GraphLoader<S> {
    store: S,
}

impl<S> GraphLoader<S>
where
    S: GraphStore + Send + Sync,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn load(&self, record: &ExtractedDocument) -> Result<LoadSummary, GraphError> {
        let Some(document_name) = record.document_name.as_deref() else {
            warn!("record has no document_name, nothing to load");
            return Ok(LoadSummary {
                skipped: 1,
                ..Default::default()
            });
        };

        let document = GraphNode::new(NodeLabel::Document, document_name);
        self.store.merge_node(&document).await?;
        let mut summary = LoadSummary {
            documents: 1,
            ..Default::default()
        };

        if let Some(sender) = record.sender.as_deref() {
            self.store
                .merge_relationship(&Relationship {
                    from: GraphNode::new(NodeLabel::Sender, sender),
                    kind: RelationKind::Sent,
                    to: document.clone(),
                })
                .await?;
            summary.senders = 1;
        }

        if let Some(company) = record.company.as_deref() {
            self.store
                .merge_relationship(&Relationship {
                    from: GraphNode::new(NodeLabel::Company, company),
                    kind: RelationKind::RelatedTo,
                    to: document.clone(),
                })
                .await?;
            summary.companies = 1;
        }

        debug!(document = document_name, ?summary, "record loaded");
        Ok(summary)
    }

    pub async fn load_all(&self, records: &[ExtractedDocument]) -> Result<LoadSummary, GraphError> {
        let mut total = LoadSummary::default();
        for record in records {
            total.absorb(self.load(record).await?);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryGraph;

    fn record(name: Option<&str>, sender: Option<&str>, company: Option<&str>) -> ExtractedDocument {
        ExtractedDocument {
            document_name: name.map(str::to_string),
            sender: sender.map(str::to_string),
            company: company.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn full_record_creates_three_nodes_and_two_edges() {
        let loader = GraphLoader::new(InMemoryGraph::new());
        let summary = loader
            .load(&record(Some("Contrat"), Some("Ana"), Some("ACME")))
            .await
            .expect("load");

        assert_eq!(summary, LoadSummary { documents: 1, senders: 1, companies: 1, skipped: 0 });
        assert_eq!(loader.store().node_count(), 3);

        let relationships = loader.store().relationships();
        assert_eq!(relationships.len(), 2);
        assert!(relationships.contains(&Relationship {
            from: GraphNode::new(NodeLabel::Sender, "Ana"),
            kind: RelationKind::Sent,
            to: GraphNode::new(NodeLabel::Document, "Contrat"),
        }));
        assert!(relationships.contains(&Relationship {
            from: GraphNode::new(NodeLabel::Company, "ACME"),
            kind: RelationKind::RelatedTo,
            to: GraphNode::new(NodeLabel::Document, "Contrat"),
        }));
    }

    #[tokio::test]
    async fn loading_twice_is_idempotent() {
        let loader = GraphLoader::new(InMemoryGraph::new());
        let input = record(Some("Contrat"), Some("Ana"), Some("ACME"));

        loader.load(&input).await.expect("first load");
        let nodes_once = loader.store().node_count();
        let edges_once = loader.store().relationship_count();

        loader.load(&input).await.expect("second load");
        assert_eq!(loader.store().node_count(), nodes_once);
        assert_eq!(loader.store().relationship_count(), edges_once);
    }

    #[tokio::test]
    async fn missing_sender_and_company_create_only_the_document() {
        let loader = GraphLoader::new(InMemoryGraph::new());
        loader
            .load(&record(Some("Note"), None, None))
            .await
            .expect("load");

        let graph = loader.into_store();
        assert_eq!(graph.nodes(), vec![GraphNode::new(NodeLabel::Document, "Note")]);
        assert_eq!(graph.relationship_count(), 0);
    }

    #[tokio::test]
    async fn records_without_document_name_are_skipped() {
        let loader = GraphLoader::new(InMemoryGraph::new());
        let summary = loader
            .load_all(&[record(None, Some("Ana"), None), record(Some("Devis"), None, Some("ACME"))])
            .await
            .expect("load");

        assert_eq!(summary, LoadSummary { documents: 1, senders: 0, companies: 1, skipped: 1 });
        assert_eq!(loader.store().node_count(), 2);
    }

    #[tokio::test]
    async fn shared_senders_collapse_into_one_node() {
        let loader = GraphLoader::new(InMemoryGraph::new());
        loader
            .load_all(&[
                record(Some("A"), Some("Ana"), None),
                record(Some("B"), Some("Ana"), None),
            ])
            .await
            .expect("load");

        assert_eq!(loader.store().node_count(), 3);
        assert_eq!(loader.store().relationship_count(), 2);
    }
}

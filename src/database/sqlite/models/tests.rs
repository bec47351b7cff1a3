use super::*;

fn sample_row() -> RecordRow {
    RecordRow {
        id: "rec-1".to_string(),
        business_unit_id: "tenant-a".to_string(),
        category: Some("Skincare".to_string()),
        heading: Some("How often should I exfoliate?".to_string()),
        body: "Two to three times a week.".to_string(),
        extra: Some("2-3x weekly".to_string()),
        embedding: None,
        embedding_model: None,
        embedded_at: None,
        created_at: Utc::now(),
    }
}

#[test]
fn entity_kind_round_trips_through_strings() {
    for kind in EntityKind::BACKFILL_ORDER {
        let parsed: EntityKind = kind.to_string().parse().expect("display output parses");
        assert_eq!(parsed, kind);
    }

    assert_eq!("FAQs".parse::<EntityKind>(), Ok(EntityKind::Faq));
    assert_eq!(
        "knowledge_base".parse::<EntityKind>(),
        Ok(EntityKind::KnowledgeBase)
    );
    assert!("products".parse::<EntityKind>().is_err());
}

#[test]
fn backfill_order_is_fixed() {
    let tables: Vec<&str> = EntityKind::BACKFILL_ORDER
        .iter()
        .map(|kind| kind.table_name())
        .collect();
    assert_eq!(
        tables,
        [
            "knowledge_base",
            "guidelines",
            "training_data",
            "faq_library",
            "canned_messages"
        ]
    );
}

#[test]
fn entity_kind_serialization() {
    let json = serde_json::to_string(&EntityKind::CannedMessage).expect("can serialize json");
    assert_eq!(json, "\"canned_message\"");
}

#[test]
fn row_converts_into_faq() {
    let record = sample_row()
        .into_record(EntityKind::Faq)
        .expect("row is a valid faq");

    assert_eq!(record.kind(), EntityKind::Faq);
    assert!(!record.is_embedded());
    assert_eq!(
        record.content,
        RecordContent::Faq {
            question: "How often should I exfoliate?".to_string(),
            answer: "Two to three times a week.".to_string(),
            short_answer: Some("2-3x weekly".to_string()),
        }
    );
}

#[test]
fn required_heading_is_enforced() {
    let mut row = sample_row();
    row.heading = None;

    assert!(row.clone().into_record(EntityKind::Guideline).is_err());
    let record = row
        .into_record(EntityKind::KnowledgeBase)
        .expect("knowledge base topic is optional");
    assert_eq!(
        record.content,
        RecordContent::KnowledgeBase {
            topic: None,
            content: "Two to three times a week.".to_string(),
        }
    );
}

#[test]
fn partial_embedding_metadata_is_rejected() {
    let mut row = sample_row();
    row.embedding = Some(vector_to_blob(&[0.1, 0.2]));
    assert!(row.into_record(EntityKind::Faq).is_err());
}

#[test]
fn empty_vector_is_not_embedded() {
    let mut row = sample_row();
    row.embedding = Some(Vec::new());
    row.embedding_model = Some("text-embedding-3-small".to_string());
    row.embedded_at = Some(Utc::now());

    let record = row.into_record(EntityKind::Faq).expect("valid row");
    assert!(record.embedding.is_some());
    assert!(!record.is_embedded());
}

#[test]
fn vector_blob_encoding() {
    let vector = vec![0.0, -1.5, 3.25, f32::MIN_POSITIVE];
    let blob = vector_to_blob(&vector);
    assert_eq!(blob.len(), 16);
    assert_eq!(vector_from_blob(&blob).expect("valid blob"), vector);
    assert!(vector_from_blob(&[0, 1, 2]).is_err());
}

#[test]
fn content_reports_its_kind_and_columns() {
    let content = RecordContent::CannedMessage {
        title: None,
        message: "Thanks for reaching out!".to_string(),
    };
    assert_eq!(content.kind(), EntityKind::CannedMessage);
    assert_eq!(
        content.column_values(),
        (None, "Thanks for reaching out!", None)
    );
    assert_eq!(
        EntityKind::CannedMessage.text_columns(),
        ("title", "message", None)
    );
}

#[test]
fn embedding_counts_total() {
    let counts = EmbeddingCounts {
        embedded: 4,
        pending: 3,
    };
    assert_eq!(counts.total(), 7);
}

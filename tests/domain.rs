use assert_matches::assert_matches;

use kepler_sync::domain::{CampaignCode, Dataset, Segment, Selection};
use kepler_sync::error::SyncError;
use kepler_sync::registry::ArchiveCatalog;

#[test]
fn parse_dataset() {
    assert_eq!("kepler".parse::<Dataset>().unwrap(), Dataset::Kepler);
    assert_eq!(" K2 ".parse::<Dataset>().unwrap(), Dataset::K2);
    assert_matches!("tess".parse::<Dataset>(), Err(SyncError::InvalidDataset(_)));
}

#[test]
fn parse_campaign_codes() {
    assert!("c102".parse::<CampaignCode>().is_ok());
    assert!("Q17".parse::<CampaignCode>().is_ok());
    assert!("".parse::<CampaignCode>().is_err());
    assert!("c1/../c2".parse::<CampaignCode>().is_err());
}

#[test]
fn segment_names() {
    let segment = Segment::new(Dataset::K2, "c12".parse().unwrap(), 3);
    assert_eq!(segment.name(), "public_c12_long_3");
    assert_eq!(segment.archive_file_name(), "public_c12_long_3.tgz");
    assert_eq!(segment.to_string(), "k2:public_c12_long_3");
}

#[test]
fn selection_parsing() {
    assert_eq!(Selection::parse("all"), Selection::All);
    assert_eq!(Selection::parse(""), Selection::All);
    assert_eq!(
        Selection::parse("c1, c5,,"),
        Selection::Only(vec!["c1".to_string(), "c5".to_string()])
    );
    assert_eq!(Selection::parse("K2").datasets(), vec![Dataset::K2]);
    assert_eq!(
        Selection::parse("all").datasets(),
        vec![Dataset::Kepler, Dataset::K2]
    );
    assert!(Selection::parse("tess").datasets().is_empty());
}

#[test]
fn registry_expands_segments_from_one() {
    let registry = ArchiveCatalog::from_entries(
        Dataset::Kepler,
        [("Q1".to_string(), 1), ("Q2".to_string(), 2)],
    )
    .unwrap();
    let names = registry
        .segments(&Selection::All)
        .iter()
        .map(Segment::name)
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["public_Q1_long_1", "public_Q2_long_1", "public_Q2_long_2"]
    );
    assert!(registry.segments(&Selection::parse("Q9")).is_empty());
}

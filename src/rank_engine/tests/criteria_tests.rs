use super::test_utils::{sample_catalog, setup_engine, setup_engine_with};
use crate::rank_engine::{
    criteria::{CriteriaOutcome, Criterion, RemoveOutcome},
    rank::Rank,
    types::{CatalogEntity, RankError, RankType},
};

fn rank_for(rank_type: RankType, resource_id: u64) -> Rank {
    let mut rank = Rank::with_type(rank_type);
    rank.set_resource(resource_id).unwrap();
    rank
}

// ============================================================================
// single_term
// ============================================================================

#[test]
fn test_single_term_add_twice_then_other() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::SingleTerm, 101);

    assert_eq!(engine.add_criteria(&mut rank, &[5]).unwrap(), CriteriaOutcome::Added);
    assert_eq!(
        engine.add_criteria(&mut rank, &[5]).unwrap(),
        CriteriaOutcome::DuplicateIgnored
    );
    assert_eq!(
        engine.add_criteria(&mut rank, &[9]).unwrap(),
        CriteriaOutcome::OtherCriteriaExists
    );
    assert_eq!(rank.criteria().unwrap().criteria(), vec![Criterion::term(2, 5)]);
}

#[test]
fn test_single_term_readd_after_facet_move_is_duplicate() {
    let (_temp_dir, mut engine) = setup_engine();
    let mut rank = rank_for(RankType::SingleTerm, 101);
    assert_eq!(engine.add_criteria(&mut rank, &[5]).unwrap(), CriteriaOutcome::Added);

    engine.catalog_mut().move_term(5, 3);
    assert_eq!(
        engine.add_criteria(&mut rank, &[5]).unwrap(),
        CriteriaOutcome::DuplicateIgnored
    );
    // the staged criterion keeps the facet it was added under
    assert_eq!(rank.criteria().unwrap().criteria(), vec![Criterion::term(2, 5)]);
    assert_eq!(
        engine.add_criteria(&mut rank, &[9]).unwrap(),
        CriteriaOutcome::OtherCriteriaExists
    );
}

#[test]
fn test_single_term_not_related_leaves_rank_untouched() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::SingleTerm, 303);

    assert_eq!(
        engine.add_criteria(&mut rank, &[5]).unwrap(),
        CriteriaOutcome::ResourceNotRelatedToTerm
    );
    assert!(rank.criteria().unwrap().is_empty());
}

#[test]
fn test_single_term_unknown_id_is_referential_error() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::SingleTerm, 101);

    let err = engine.add_criteria(&mut rank, &[404]).unwrap_err();
    assert!(matches!(
        err,
        RankError::UnknownId {
            kind: CatalogEntity::Term,
            id: 404
        }
    ));
}

#[test]
fn test_single_term_takes_one_id() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::SingleTerm, 101);
    assert!(matches!(
        engine.add_criteria(&mut rank, &[5, 9]),
        Err(RankError::Validation(_))
    ));
}

// ============================================================================
// facet
// ============================================================================

#[test]
fn test_facet_add_related_and_unrelated() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::Facet, 101);

    assert_eq!(
        engine.add_criteria(&mut rank, &[4]).unwrap(),
        CriteriaOutcome::ResourceNotRelatedToFacet
    );
    assert_eq!(engine.add_criteria(&mut rank, &[2]).unwrap(), CriteriaOutcome::Added);
    assert_eq!(
        engine.add_criteria(&mut rank, &[2]).unwrap(),
        CriteriaOutcome::DuplicateIgnored
    );
    assert_eq!(
        engine.add_criteria(&mut rank, &[3]).unwrap(),
        CriteriaOutcome::OtherCriteriaExists
    );
    let rows = rank.criteria().unwrap().criteria();
    assert_eq!(rows, vec![Criterion::facet(2)]);
}

#[test]
fn test_facet_relation_can_be_relaxed() {
    let (_temp_dir, engine) =
        setup_engine_with(sample_catalog(), |c| c.with_require_facet_relation(false));
    let mut rank = rank_for(RankType::Facet, 101);
    assert_eq!(engine.add_criteria(&mut rank, &[4]).unwrap(), CriteriaOutcome::Added);
}

#[test]
fn test_facet_unknown_id() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::Facet, 101);
    assert!(matches!(
        engine.add_criteria(&mut rank, &[99]),
        Err(RankError::UnknownId {
            kind: CatalogEntity::Facet,
            id: 99
        })
    ));
}

// ============================================================================
// combined_term
// ============================================================================

#[test]
fn test_combined_repeated_ids_are_collapsed() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::CombinedTerm, 101);

    assert_eq!(
        engine.add_criteria(&mut rank, &[5, 9, 5]).unwrap(),
        CriteriaOutcome::Added
    );
    assert_eq!(rank.criteria().unwrap().len(), 2);
    assert_eq!(rank.criteria().unwrap().canonical_key().unwrap().as_str(), "9,5");
}

#[test]
fn test_combined_reports_every_problem_in_batch() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::CombinedTerm, 101);
    engine.add_criteria(&mut rank, &[5]).unwrap();

    assert_eq!(
        engine.add_criteria(&mut rank, &[5, 11, 9]).unwrap(),
        CriteriaOutcome::DuplicateAndUnrelated
    );
    // the valid id in the batch is still staged
    assert_eq!(rank.criteria().unwrap().context_ids(), vec![5, 9]);

    assert_eq!(
        engine.add_criteria(&mut rank, &[9]).unwrap(),
        CriteriaOutcome::DuplicateIgnored
    );
}

#[test]
fn test_combined_unrelated_and_unknown_ids() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::CombinedTerm, 101);

    assert_eq!(
        engine.add_criteria(&mut rank, &[5, 11, 777]).unwrap(),
        CriteriaOutcome::ResourceNotRelatedToTerm
    );
    assert_eq!(rank.criteria().unwrap().context_ids(), vec![5]);
}

// ============================================================================
// preconditions
// ============================================================================

#[test]
fn test_add_requires_resource_and_type() {
    let (_temp_dir, engine) = setup_engine();

    let mut untyped = Rank::new();
    untyped.set_resource(101).unwrap();
    assert!(matches!(
        engine.add_criteria(&mut untyped, &[5]),
        Err(RankError::MissingAttribute("type"))
    ));

    let mut unowned = Rank::with_type(RankType::SingleTerm);
    assert!(matches!(
        engine.add_criteria(&mut unowned, &[5]),
        Err(RankError::MissingAttribute("resource_id"))
    ));
}

#[test]
fn test_add_rejects_empty_batch() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::CombinedTerm, 101);
    assert!(matches!(
        engine.add_criteria(&mut rank, &[]),
        Err(RankError::Validation(_))
    ));
}

// ============================================================================
// remove_criteria
// ============================================================================

#[test]
fn test_remove_single_term() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::SingleTerm, 101);
    engine.add_criteria(&mut rank, &[5]).unwrap();

    assert_eq!(engine.remove_criteria(&mut rank, 9).unwrap(), RemoveOutcome::NotFound);
    assert_eq!(engine.remove_criteria(&mut rank, 5).unwrap(), RemoveOutcome::Removed);
    assert_eq!(engine.remove_criteria(&mut rank, 5).unwrap(), RemoveOutcome::NotFound);

    // replace-not-append: after removal a different term is accepted
    assert_eq!(engine.add_criteria(&mut rank, &[9]).unwrap(), CriteriaOutcome::Added);
}

#[test]
fn test_remove_facet() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::Facet, 101);
    engine.add_criteria(&mut rank, &[2]).unwrap();

    assert_eq!(engine.remove_criteria(&mut rank, 3).unwrap(), RemoveOutcome::NotFound);
    assert_eq!(engine.remove_criteria(&mut rank, 2).unwrap(), RemoveOutcome::Removed);
    assert!(rank.criteria().unwrap().is_empty());
}

#[test]
fn test_remove_one_of_combined() {
    let (_temp_dir, engine) = setup_engine();
    let mut rank = rank_for(RankType::CombinedTerm, 101);
    engine.add_criteria(&mut rank, &[5, 9]).unwrap();

    assert_eq!(engine.remove_criteria(&mut rank, 5).unwrap(), RemoveOutcome::Removed);
    assert_eq!(rank.criteria().unwrap().context_ids(), vec![9]);
}

#[test]
fn test_remove_term_missing_from_catalog() {
    let (_temp_dir, mut engine) = setup_engine();
    let mut rank = rank_for(RankType::SingleTerm, 101);
    engine.add_criteria(&mut rank, &[5]).unwrap();

    engine.catalog_mut().remove_term(5);
    assert_eq!(engine.remove_criteria(&mut rank, 5).unwrap(), RemoveOutcome::Removed);
}

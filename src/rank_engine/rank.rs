use crate::rank_engine::{
    criteria::{Criterion, RankCriteriaSet},
    storage_core::RankRecord,
    types::{RankError, RankId, RankResult, RankType, RankValue, ResourceId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankState {
    /// Never committed; has no id.
    Transient,
    /// Has an id and a row in the store.
    Persisted,
    /// Removed from the store. Terminal.
    Deleted,
}

/// One ranking assertion, staged in memory until committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rank {
    rank_id: Option<RankId>,
    state: RankState,
    value: Option<RankValue>,
    resource_id: Option<ResourceId>,
    criteria: Option<RankCriteriaSet>,
}

impl Default for Rank {
    fn default() -> Self {
        Self::new()
    }
}

impl Rank {
    pub fn new() -> Self {
        Self {
            rank_id: None,
            state: RankState::Transient,
            value: None,
            resource_id: None,
            criteria: None,
        }
    }

    pub fn with_type(rank_type: RankType) -> Self {
        Self {
            criteria: Some(RankCriteriaSet::empty(rank_type)),
            ..Self::new()
        }
    }

    pub(crate) fn from_record(record: &RankRecord, criteria: Vec<Criterion>) -> Self {
        Self {
            rank_id: Some(record.rank_id),
            state: RankState::Persisted,
            value: Some(record.value),
            resource_id: Some(record.resource_id),
            criteria: Some(RankCriteriaSet::from_rows(record.rank_type, criteria)),
        }
    }

    pub fn rank_id(&self) -> Option<RankId> {
        self.rank_id
    }

    pub fn state(&self) -> RankState {
        self.state
    }

    pub fn value(&self) -> Option<RankValue> {
        self.value
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.resource_id
    }

    pub fn rank_type(&self) -> Option<RankType> {
        self.criteria.as_ref().map(RankCriteriaSet::rank_type)
    }

    pub fn criteria(&self) -> Option<&RankCriteriaSet> {
        self.criteria.as_ref()
    }

    pub(crate) fn criteria_mut(&mut self) -> Option<&mut RankCriteriaSet> {
        self.criteria.as_mut()
    }

    pub fn is_persisted(&self) -> bool {
        self.state == RankState::Persisted
    }

    /// Sets the type. A type, once set, cannot be changed.
    pub fn set_rank_type(&mut self, rank_type: RankType) -> RankResult<()> {
        self.ensure_not_deleted()?;
        match &self.criteria {
            None => {
                self.criteria = Some(RankCriteriaSet::empty(rank_type));
                Ok(())
            }
            Some(existing) if existing.rank_type() == rank_type => Ok(()),
            Some(existing) => Err(RankError::InvalidState(format!(
                "rank type is fixed at {}, cannot change to {rank_type}",
                existing.rank_type()
            ))),
        }
    }

    pub fn set_value(&mut self, value: RankValue) -> RankResult<()> {
        self.ensure_not_deleted()?;
        self.value = Some(value);
        Ok(())
    }

    /// Criteria are validated against the resource, so the resource can only
    /// change while no criteria are staged.
    pub fn set_resource(&mut self, resource_id: ResourceId) -> RankResult<()> {
        self.ensure_not_deleted()?;
        let has_criteria = self.criteria.as_ref().is_some_and(|c| !c.is_empty());
        if has_criteria && self.resource_id != Some(resource_id) {
            return Err(RankError::InvalidState(
                "remove criteria before changing the resource".to_string(),
            ));
        }
        self.resource_id = Some(resource_id);
        Ok(())
    }

    /// Type, resource, value and a non-empty criteria set, or the first
    /// missing attribute.
    pub(crate) fn required_attributes(
        &self,
    ) -> RankResult<(RankType, ResourceId, RankValue, &RankCriteriaSet)> {
        let criteria = self.criteria.as_ref().ok_or(RankError::MissingAttribute("type"))?;
        let resource_id = self.resource_id.ok_or(RankError::MissingAttribute("resource_id"))?;
        let value = self.value.ok_or(RankError::MissingAttribute("value"))?;
        if criteria.is_empty() {
            return Err(RankError::MissingAttribute("criteria"));
        }
        Ok((criteria.rank_type(), resource_id, value, criteria))
    }

    pub(crate) fn ensure_not_deleted(&self) -> RankResult<()> {
        if self.state == RankState::Deleted {
            return Err(RankError::InvalidState("rank has been deleted".to_string()));
        }
        Ok(())
    }

    pub(crate) fn mark_persisted(&mut self, rank_id: RankId) {
        self.rank_id = Some(rank_id);
        self.state = RankState::Persisted;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = RankState::Deleted;
    }

    pub(crate) fn store_value(&mut self, value: RankValue) {
        self.value = Some(value);
    }
}

//! Topic vector post-processing: topic merging, controversy collapsing and
//! majority vote.

use ndarray::Array1;
use num::Num;

use crate::{dictionary::TopicDictionary, error::Result, utils::vector::argmax};

/// topic folded into `GOVERNMENT_OPS` for every document
pub const ELECTION_CAMPAIGN: &str = "election_campaign";
pub const GOVERNMENT_OPS: &str = "government_ops";
/// candidate neutral controversy topic
pub const GENERAL_CONTROVERSIES: &str = "general_controversies";

/// `{candidate}_controversies`
pub fn candidate_controversies(candidate: &str) -> String {
    format!("{candidate}_controversies")
}

#[inline]
fn merge_at<N: Num + Copy>(vec: &Array1<N>, merge_to: usize, to_merge: usize) -> Array1<N> {
    let mut out = vec.clone();
    out[to_merge] = N::zero();
    out[merge_to] = out[merge_to] + vec[to_merge];
    out
}

#[inline]
fn collapse_at<N: Num + Copy + PartialOrd>(vec: &Array1<N>, general: usize, specific: usize) -> Array1<N> {
    let mut out = vec.clone();
    if vec[general] > N::zero() {
        out[general] = N::zero();
        out[specific] = out[specific] + vec[general];
    }
    out
}

/// Move the value of `to_merge` into `merge_to` and zero the `to_merge` slot.
///
/// # Errors
/// `DictError::Config` when either topic is not in the dictionary
pub fn merge_topic<N>(vec: &Array1<N>, merge_to: &str, to_merge: &str, dict: &TopicDictionary) -> Result<Array1<N>>
where
    N: Num + Copy,
{
    assert_eq!(vec.len(), dict.n_topics(), "topic vector length must match the dictionary");
    let merge_to = dict.require_topic(merge_to)?;
    let to_merge = dict.require_topic(to_merge)?;
    Ok(merge_at(vec, merge_to, to_merge))
}

/// Fold a positive `general_controversies` value into `{candidate}_controversies`.
///
/// # Errors
/// `DictError::Config` when either topic is not in the dictionary
pub fn collapse_general_controversies<N>(vec: &Array1<N>, candidate: &str, dict: &TopicDictionary) -> Result<Array1<N>>
where
    N: Num + Copy + PartialOrd,
{
    assert_eq!(vec.len(), dict.n_topics(), "topic vector length must match the dictionary");
    let general = dict.require_topic(GENERAL_CONTROVERSIES)?;
    let specific = dict.require_topic(&candidate_controversies(candidate))?;
    Ok(collapse_at(vec, general, specific))
}

/// One-hot vector at the largest entry, lowest index on ties.
/// An all-zero vector is a tie everywhere and votes for index 0.
pub fn majority_vote<N>(vec: &Array1<N>) -> Array1<N>
where
    N: Num + Copy + PartialOrd,
{
    let mut out = Array1::from_elem(vec.len(), N::zero());
    if let Some(idx) = argmax(vec.view()) {
        out[idx] = N::one();
    }
    out
}

/// The per-document topic pipeline applied before aggregation:
/// `election_campaign -> government_ops`, `general_controversies ->
/// {candidate}_controversies`, then majority vote.
///
/// Topic indices are resolved once at construction.
#[derive(Debug, Clone)]
pub struct PostProcess {
    merge_to: usize,
    to_merge: usize,
    general: usize,
    specific: usize,
}

impl PostProcess {
    pub fn new(dict: &TopicDictionary, candidate: &str) -> Result<Self> {
        Ok(Self {
            merge_to: dict.require_topic(GOVERNMENT_OPS)?,
            to_merge: dict.require_topic(ELECTION_CAMPAIGN)?,
            general: dict.require_topic(GENERAL_CONTROVERSIES)?,
            specific: dict.require_topic(&candidate_controversies(candidate))?,
        })
    }

    /// merged and collapsed topic vector, before the vote
    pub fn adjust<N: Num + Copy + PartialOrd>(&self, topic_vec: &Array1<N>) -> Array1<N> {
        let merged = merge_at(topic_vec, self.merge_to, self.to_merge);
        collapse_at(&merged, self.general, self.specific)
    }

    pub fn apply<N: Num + Copy + PartialOrd>(&self, topic_vec: &Array1<N>) -> Array1<N> {
        majority_vote(&self.adjust(topic_vec))
    }
}

//! Ratings, user-submitted products and reward cards

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::events::{CommunityEvent, DomainEvent};
use crate::domain::value_objects::Score;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub score: Score,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(product_id: Uuid, user_id: Uuid, score: Score, comment: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), product_id, user_id, score, comment, created_at: Utc::now() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus { #[default] Pending, Accepted, Rejected }

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str { match self { Self::Pending => "PENDING", Self::Accepted => "ACCEPTED", Self::Rejected => "REJECTED" } }
    pub fn parse(s: &str) -> Option<Self> {
        match s { "PENDING" => Some(Self::Pending), "ACCEPTED" => Some(Self::Accepted), "REJECTED" => Some(Self::Rejected), _ => None }
    }
}

/// A product design submitted by a community member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProduct {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub images: Vec<String>,
    pub status: SubmissionStatus,
    pub num_votes: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl UserProduct {
    pub const FIRST_SUBMISSION_POINTS: i32 = 100;
    pub const APPROVAL_POINTS: i32 = 20;
    pub const REJECTION_POINTS: i32 = -10;
    pub const VOTE_POINTS: i32 = 5;

    pub fn submit(owner_id: Uuid, name: impl Into<String>, images: Vec<String>) -> Self {
        let mut p = Self {
            id: Uuid::now_v7(), owner_id, name: name.into(), images, status: SubmissionStatus::Pending,
            num_votes: 0, created_at: Utc::now(), events: vec![],
        };
        p.raise_event(DomainEvent::Community(CommunityEvent::Submitted { user_product_id: p.id, owner_id }));
        p
    }

    pub fn restore(id: Uuid, owner_id: Uuid, name: String, images: Vec<String>, status: SubmissionStatus, num_votes: i32, created_at: DateTime<Utc>) -> Self {
        Self { id, owner_id, name, images, status, num_votes, created_at, events: vec![] }
    }

    pub fn approve(&mut self) -> Result<(), CommunityError> {
        if self.status != SubmissionStatus::Pending { return Err(CommunityError::AlreadyReviewed); }
        self.status = SubmissionStatus::Accepted;
        self.raise_event(DomainEvent::Community(CommunityEvent::Approved { user_product_id: self.id, owner_id: self.owner_id }));
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), CommunityError> {
        if self.status != SubmissionStatus::Pending { return Err(CommunityError::AlreadyReviewed); }
        self.status = SubmissionStatus::Rejected;
        self.raise_event(DomainEvent::Community(CommunityEvent::Rejected { user_product_id: self.id, owner_id: self.owner_id }));
        Ok(())
    }

    /// Checks a vote is allowed and counts it. Duplicate votes are caught by storage.
    pub fn register_vote(&mut self, voter: Uuid) -> Result<(), CommunityError> {
        if voter == self.owner_id { return Err(CommunityError::OwnProduct); }
        if self.status != SubmissionStatus::Accepted { return Err(CommunityError::NotOpenForVoting); }
        self.num_votes += 1;
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductVote {
    pub user_product_id: Uuid,
    pub user_id: Uuid,
    pub voted_at: DateTime<Utc>,
}

/// One-shot percentage discount bought with points.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardCard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub required_points: i32,
    pub discount_percentage: i32,
    pub redeemed: bool,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl RewardCard {
    /// Points tiers and the discount each one buys.
    pub const TIERS: [(i32, i32); 2] = [(500, 10), (950, 15)];

    pub fn for_points(user_id: Uuid, required_points: i32) -> Result<Self, CommunityError> {
        let discount = Self::TIERS.iter().find(|(p, _)| *p == required_points).map(|(_, d)| *d).ok_or(CommunityError::InvalidTier(required_points))?;
        Ok(Self {
            id: Uuid::now_v7(), user_id, required_points, discount_percentage: discount, redeemed: false,
            created_at: Utc::now(), redeemed_at: None,
        })
    }

    pub fn redeem(&mut self, now: DateTime<Utc>) { self.redeemed = true; self.redeemed_at = Some(now); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommunityError { AlreadyReviewed, OwnProduct, NotOpenForVoting, InvalidTier(i32) }
impl std::error::Error for CommunityError {}
impl fmt::Display for CommunityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyReviewed => write!(f, "Submission has already been reviewed"),
            Self::OwnProduct => write!(f, "You cannot vote for your own product"),
            Self::NotOpenForVoting => write!(f, "Product is not open for voting"),
            Self::InvalidTier(p) => write!(f, "No reward card costs {p} points"),
        }
    }
}

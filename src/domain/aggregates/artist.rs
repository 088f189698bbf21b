//! Artist profiles, their events and verification requests

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{ArtistEvent, DomainEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtistError {
    #[error("Artist is not verified to create events")]
    NotVerified,
    #[error("Event date cannot be in the past")]
    PastDate,
    #[error("This event does not belong to you")]
    NotOwner,
    #[error("Verification request was already reviewed")]
    AlreadyReviewed,
}

/// Public-facing side of an account with the `ARTIST` role. Keyed by the
/// owning user's id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artist {
    pub user_id: Uuid,
    pub artist_name: String,
    pub url: Option<String>,
    pub verified: bool,
    pub main_view_photo: Option<String>,
    pub main_color: Option<String>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Artist {
    pub fn register(user_id: Uuid, artist_name: impl Into<String>, url: Option<String>, main_view_photo: Option<String>, main_color: Option<String>) -> Self {
        let mut a = Self { user_id, artist_name: artist_name.into(), url, verified: false, main_view_photo, main_color, events: vec![] };
        a.raise_event(DomainEvent::Artist(ArtistEvent::Registered { artist_id: user_id, artist_name: a.artist_name.clone() }));
        a
    }

    pub fn restore(user_id: Uuid, artist_name: String, url: Option<String>, verified: bool, main_view_photo: Option<String>, main_color: Option<String>) -> Self {
        Self { user_id, artist_name, url, verified, main_view_photo, main_color, events: vec![] }
    }

    /// Name of the catalog category that groups this artist's products.
    pub fn category_name(&self) -> String { self.artist_name.trim().to_uppercase() }

    pub fn mark_verified(&mut self) { self.verified = true; }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

/// A concert, exhibition or signing announced by an artist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub location: String,
    pub more_info: Option<String>,
    pub image: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Editable part of an event.
#[derive(Clone, Debug)]
pub struct EventDetails {
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub location: String,
    pub more_info: Option<String>,
    pub image: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Event {
    pub fn schedule(artist: &Artist, details: EventDetails, today: NaiveDate) -> Result<Self, ArtistError> {
        if !artist.verified { return Err(ArtistError::NotVerified); }
        if details.date < today { return Err(ArtistError::PastDate); }
        let mut event = Self {
            id: Uuid::now_v7(), artist_id: artist.user_id, name: String::new(), description: String::new(), date: details.date,
            location: String::new(), more_info: None, image: None, latitude: None, longitude: None,
        };
        event.apply(details);
        Ok(event)
    }

    pub fn edit(&mut self, artist_id: Uuid, details: EventDetails, today: NaiveDate) -> Result<(), ArtistError> {
        self.ensure_owner(artist_id)?;
        if details.date < today { return Err(ArtistError::PastDate); }
        self.apply(details);
        Ok(())
    }

    pub fn ensure_owner(&self, artist_id: Uuid) -> Result<(), ArtistError> {
        if self.artist_id == artist_id { Ok(()) } else { Err(ArtistError::NotOwner) }
    }

    pub fn is_upcoming(&self, today: NaiveDate) -> bool { self.date >= today }

    fn apply(&mut self, d: EventDetails) {
        self.name = d.name;
        self.description = d.description;
        self.date = d.date;
        self.location = d.location;
        self.more_info = d.more_info;
        self.image = d.image;
        self.latitude = d.latitude;
        self.longitude = d.longitude;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus { #[default] Pending, Accepted, Rejected }

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str { match self { Self::Pending => "PENDING", Self::Accepted => "ACCEPTED", Self::Rejected => "REJECTED" } }
    pub fn parse(s: &str) -> Option<Self> {
        match s { "PENDING" => Some(Self::Pending), "ACCEPTED" => Some(Self::Accepted), "REJECTED" => Some(Self::Rejected), _ => None }
    }
}

/// An artist asking moderators to confirm their identity with a video.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Verification {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub video_url: String,
    pub status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Verification {
    pub fn request(artist: &Artist, video_url: impl Into<String>) -> Self {
        let mut v = Self {
            id: Uuid::now_v7(), artist_id: artist.user_id, video_url: video_url.into(),
            status: VerificationStatus::Pending, created_at: Utc::now(), events: vec![],
        };
        v.raise_event(DomainEvent::Artist(ArtistEvent::VerificationRequested {
            verification_id: v.id, artist_id: artist.user_id, artist_name: artist.artist_name.clone(),
        }));
        v
    }

    pub fn restore(id: Uuid, artist_id: Uuid, video_url: String, status: VerificationStatus, created_at: DateTime<Utc>) -> Self {
        Self { id, artist_id, video_url, status, created_at, events: vec![] }
    }

    pub fn accept(&mut self) -> Result<(), ArtistError> {
        if self.status != VerificationStatus::Pending { return Err(ArtistError::AlreadyReviewed); }
        self.status = VerificationStatus::Accepted;
        self.raise_event(DomainEvent::Artist(ArtistEvent::Verified { artist_id: self.artist_id, verification_id: self.id }));
        Ok(())
    }

    pub fn refuse(&mut self) -> Result<(), ArtistError> {
        if self.status != VerificationStatus::Pending { return Err(ArtistError::AlreadyReviewed); }
        self.status = VerificationStatus::Rejected;
        self.raise_event(DomainEvent::Artist(ArtistEvent::VerificationRefused { artist_id: self.artist_id, verification_id: self.id }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn artist(user_id: Uuid, verified: bool) -> Artist {
        let mut a = Artist::restore(user_id, "Luna Roja".into(), Some("https://lunaroja.example".into()), false, None, Some("#aa0000".into()));
        if verified { a.mark_verified(); }
        a
    }

    pub(crate) fn details(date: NaiveDate) -> EventDetails {
        EventDetails {
            name: "Release party".into(), description: "New album live".into(), date, location: "Sala Sol, Madrid".into(),
            more_info: None, image: None, latitude: Some(40.42), longitude: Some(-3.70),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    #[test]
    fn test_schedule_rules() {
        let today = day(2025, 5, 10);
        let owner = artist(Uuid::now_v7(), true);
        let event = Event::schedule(&owner, details(today), today).unwrap();
        assert!(event.is_upcoming(today));
        assert_eq!(Event::schedule(&owner, details(day(2025, 5, 9)), today), Err(ArtistError::PastDate));
        assert_eq!(Event::schedule(&artist(Uuid::now_v7(), false), details(today), today), Err(ArtistError::NotVerified));
    }

    #[test]
    fn test_edit_checks_owner_and_date() {
        let today = day(2025, 5, 10);
        let owner = artist(Uuid::now_v7(), true);
        let mut event = Event::schedule(&owner, details(day(2025, 6, 1)), today).unwrap();
        assert_eq!(event.edit(Uuid::now_v7(), details(day(2025, 6, 2)), today), Err(ArtistError::NotOwner));
        assert_eq!(event.edit(owner.user_id, details(day(2025, 1, 2)), today), Err(ArtistError::PastDate));
        let mut moved = details(day(2025, 7, 1));
        moved.location = "Bilbao".into();
        event.edit(owner.user_id, moved, today).unwrap();
        assert_eq!((event.date, event.location.as_str()), (day(2025, 7, 1), "Bilbao"));
    }

    #[test]
    fn test_verification_is_reviewed_once() {
        let owner = artist(Uuid::now_v7(), false);
        let mut v = Verification::request(&owner, "https://videos.example/v.mp4");
        assert_eq!(v.take_events().len(), 1);
        v.refuse().unwrap();
        assert_eq!(v.status, VerificationStatus::Rejected);
        assert_eq!(v.accept(), Err(ArtistError::AlreadyReviewed));
        assert_eq!(owner.category_name(), "LUNA ROJA");
    }
}

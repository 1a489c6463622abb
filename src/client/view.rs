//! Display models for the directory grid and the detail panel.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Member, RoleCategory};

/// Avatar shown when a member has none.
pub const FALLBACK_AVATAR: &str = "/member-avatar.jpg";

impl RoleCategory {
    /// Accent colour used for borders and role badges.
    pub fn color(&self) -> &'static str {
        match self {
            RoleCategory::Lead => "#06B6D4",
            RoleCategory::Member => "#3B82F6",
            RoleCategory::Alumni => "#F59E0B",
        }
    }

    /// CSS background gradient for grid cards.
    pub fn gradient(&self) -> &'static str {
        match self {
            RoleCategory::Lead => "linear-gradient(145deg, #06B6D4, #000)",
            RoleCategory::Member => "linear-gradient(210deg, #3B82F6, #000)",
            RoleCategory::Alumni => "linear-gradient(165deg, #F59E0B, #000)",
        }
    }
}

/// One grid item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberCard {
    pub id: String,
    pub image: String,
    pub title: String,
    pub subtitle: String,
    pub handle: String,
    pub border_color: &'static str,
    pub gradient: &'static str,
    pub location: String,
}

impl MemberCard {
    pub fn from_member(member: &Member) -> Self {
        let category = member.role_category();
        Self {
            id: member.id.clone(),
            image: non_empty(&member.avatar_url)
                .unwrap_or(FALLBACK_AVATAR)
                .to_string(),
            title: member.name.clone(),
            subtitle: member.role.clone(),
            handle: non_empty(&member.github_handle).unwrap_or("").to_string(),
            border_color: category.color(),
            gradient: category.gradient(),
            location: member.batch.clone().unwrap_or_default(),
        }
    }
}

/// Everything the detail panel shows for one member. Links are present only
/// when the member has them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDetail {
    pub id: String,
    pub name: String,
    pub role: String,
    pub role_color: &'static str,
    pub batch: Option<String>,
    pub status: String,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub joined: NaiveDate,
    pub avatar_url: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
}

impl MemberDetail {
    pub fn from_member(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            role: member.role.clone(),
            role_color: member.role_category().color(),
            batch: member.batch.clone(),
            status: member.status_label().to_string(),
            bio: non_empty(&member.bio).map(str::to_string),
            skills: member.skills.clone(),
            joined: member.created_at.date_naive(),
            avatar_url: non_empty(&member.avatar_url).map(str::to_string),
            github_url: non_empty(&member.github_url).map(str::to_string),
            linkedin_url: non_empty(&member.linkedin_url).map(str::to_string),
        }
    }
}

/// State of the detail panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailView {
    /// Nothing selected.
    Closed,
    Open(Box<MemberDetail>),
    /// Selected, but the id is not in the current snapshot.
    Missing { id: String },
}

impl DetailView {
    pub fn is_open(&self) -> bool {
        !matches!(self, DetailView::Closed)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

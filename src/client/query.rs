//! Query engine: filtered, order-preserving projections of a snapshot.

use crate::models::Member;

/// Search text plus an optional exact role filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberQuery {
    /// Case-insensitive substring matched against name, batch, role and skills.
    pub text: String,
    /// Exact, case-sensitive role match when set.
    pub role: Option<String>,
}

impl MemberQuery {
    pub fn new(text: impl Into<String>, role: Option<String>) -> Self {
        Self {
            text: text.into(),
            role,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self::new(String::new(), Some(role.into()))
    }

    /// True when every member matches, i.e. the projection is the snapshot.
    pub fn is_identity(&self) -> bool {
        self.text.is_empty() && self.role.is_none()
    }

    pub fn matches(&self, member: &Member) -> bool {
        matches_lowered(self, &self.text.to_lowercase(), member)
    }
}

/// Members of `snapshot` matching `query`, in snapshot order.
pub fn project<'a>(snapshot: &'a [Member], query: &MemberQuery) -> Vec<&'a Member> {
    let needle = query.text.to_lowercase();
    snapshot
        .iter()
        .filter(|member| matches_lowered(query, &needle, member))
        .collect()
}

/// Indices into `snapshot` of the members matching `query`.
pub fn project_indices(snapshot: &[Member], query: &MemberQuery) -> Vec<usize> {
    let needle = query.text.to_lowercase();
    snapshot
        .iter()
        .enumerate()
        .filter(|(_, member)| matches_lowered(query, &needle, member))
        .map(|(index, _)| index)
        .collect()
}

fn matches_lowered(query: &MemberQuery, needle: &str, member: &Member) -> bool {
    if let Some(role) = &query.role {
        if member.role != *role {
            return false;
        }
    }
    needle.is_empty() || haystack(member).contains(needle)
}

/// Lowercased, space-joined searchable text of one member.
fn haystack(member: &Member) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3 + member.skills.len());
    parts.push(&member.name);
    parts.push(member.batch.as_deref().unwrap_or(""));
    parts.push(&member.role);
    parts.extend(member.skills.iter().map(String::as_str));
    parts.join(" ").to_lowercase()
}

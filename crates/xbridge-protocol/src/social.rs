//! Social-graph and achievement payloads.
//!
//! Only the fields the bridge reads are modelled; everything else the
//! services return is ignored by serde.

use serde::{Deserialize, Serialize};

use crate::Xuid;

/// One entry of a people list (friends or followers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub xuid: Xuid,
    /// The listed person follows the calling account.
    #[serde(default)]
    pub is_following_caller: bool,
    /// The calling account follows the listed person. Only people-hub
    /// lists carry it; every entry of the social friend list is already
    /// followed by the caller and omits the field.
    #[serde(default)]
    pub is_followed_by_caller: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamertag: Option<String>,
}

/// A people list as returned by the social and people-hub services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeopleList {
    #[serde(default)]
    pub people: Vec<Person>,
    /// Size of the whole set. People-hub omits it, so it is optional.
    #[serde(default)]
    pub total_count: Option<u32>,
}

impl PeopleList {
    /// Size of the list, preferring the service's own total.
    pub fn len(&self) -> usize {
        self.total_count
            .map(|c| c as usize)
            .unwrap_or(self.people.len())
            .max(self.people.len())
    }

    /// `true` when the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Progress of an achievement for the queried user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    Achieved,
    NotStarted,
    InProgress,
    #[serde(other)]
    Unknown,
}

/// An achievement entry. Only what the admission gate needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub progress_state: ProgressState,
}

impl Achievement {
    /// `true` when the user has unlocked this achievement.
    pub fn is_unlocked(&self) -> bool {
        self.progress_state == ProgressState::Achieved
    }
}

/// Body of the achievements list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementList {
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_people_list_parses_social_response() {
        let list: PeopleList = serde_json::from_value(serde_json::json!({
            "totalCount": 3,
            "people": [
                { "xuid": "1", "isFavorite": false, "isFollowingCaller": true },
                { "xuid": "2", "isFavorite": true, "isFollowingCaller": false },
                { "xuid": "3", "isFavorite": false }
            ]
        }))
        .unwrap();

        assert_eq!(list.len(), 3);
        assert!(list.people[0].is_following_caller);
        assert!(!list.people[1].is_following_caller);
        assert!(!list.people[2].is_following_caller);
    }

    #[test]
    fn test_people_list_len_without_total() {
        let list = PeopleList {
            people: vec![Person {
                xuid: Xuid::new("1"),
                is_following_caller: true,
                is_followed_by_caller: false,
                gamertag: None,
            }],
            total_count: None,
        };
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_achievement_unknown_state_is_not_unlocked() {
        let a: Achievement = serde_json::from_value(serde_json::json!({
            "id": "1", "name": "Taking Inventory", "progressState": "Hidden"
        }))
        .unwrap();
        assert_eq!(a.progress_state, ProgressState::Unknown);
        assert!(!a.is_unlocked());
    }

    #[test]
    fn test_achievement_achieved_is_unlocked() {
        let a: Achievement = serde_json::from_value(serde_json::json!({
            "id": "1", "progressState": "Achieved"
        }))
        .unwrap();
        assert!(a.is_unlocked());
    }
}

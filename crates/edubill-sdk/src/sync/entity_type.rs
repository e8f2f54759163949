//! 实体类型枚举 - 本地缓存与同步共用
//!
//! entity_type 为受控枚举，新增需同时增加 migration 表和离线 handler。

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 可缓存、可同步的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Users,
    Schools,
}

impl EntityType {
    pub const ALL: &'static [EntityType] = &[EntityType::Users, EntityType::Schools];

    /// 协议/端点中的名字（`/users`、`/sync/users`），同时也是 sync_queue.entity 的值
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Schools => "schools",
        }
    }

    /// 本地表名
    pub fn table(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Schools => "schools",
        }
    }

    /// 面向用户的单数名称（用于 "User not found" 之类的文案）
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Users => "User",
            Self::Schools => "School",
        }
    }
}

impl FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" | "user" => Ok(Self::Users),
            "schools" | "school" => Ok(Self::Schools),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_as_str_and_from_str() {
        assert_eq!(EntityType::Users.as_str(), "users");
        assert_eq!(EntityType::Schools.table(), "schools");
        assert_eq!(EntityType::from_str("users").unwrap(), EntityType::Users);
        assert_eq!(EntityType::from_str("school").unwrap(), EntityType::Schools);
        assert!(EntityType::from_str("students").is_err());
    }
}

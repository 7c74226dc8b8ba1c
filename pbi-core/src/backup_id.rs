use crate::constants::backup::{FALLBACK_WORKSPACE_NAME, MAX_WORKSPACE_NAME_LEN};
use crate::error::PbiError;
use chrono::{NaiveDateTime, Timelike};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// 备份标识
///
/// 新格式为 `{工作区名称}_{YYYYMMDD}_{HHMMSS}`，旧版本的备份使用裸 UUID。
/// 两种格式在解析时按模式区分，序列化时输出原始字符串。
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub enum BackupId {
    Legacy(Uuid),
    Structured {
        workspace: String,
        taken_at: NaiveDateTime,
    },
}

impl BackupId {
    /// 根据工作区名称和备份时间生成备份ID，时间精确到秒
    pub fn new(workspace_name: &str, taken_at: NaiveDateTime) -> Self {
        Self::Structured {
            workspace: sanitize_workspace_name(workspace_name),
            taken_at: taken_at.with_nanosecond(0).unwrap_or(taken_at),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// 新格式备份中的工作区名称
    pub fn workspace_name(&self) -> Option<&str> {
        match self {
            Self::Legacy(_) => None,
            Self::Structured { workspace, .. } => Some(workspace),
        }
    }

    pub fn taken_at(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Legacy(_) => None,
            Self::Structured { taken_at, .. } => Some(*taken_at),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// 清洗工作区名称，使其可以作为目录名和备份ID的一部分
///
/// 结果为空或只剩 `_` 时使用 `backup`。
pub fn sanitize_workspace_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if is_name_char(c) { c } else { '_' })
        .take(MAX_WORKSPACE_NAME_LEN)
        .collect();

    if sanitized.chars().all(|c| c == '_') {
        FALLBACK_WORKSPACE_NAME.to_string()
    } else {
        sanitized
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy(uuid) => write!(f, "{uuid}"),
            Self::Structured {
                workspace,
                taken_at,
            } => write!(f, "{}_{}", workspace, taken_at.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl FromStr for BackupId {
    type Err = PbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || PbiError::validation(format!("无效的备份ID: {s}"));

        if let Ok(uuid) = Uuid::parse_str(s) {
            return Ok(Self::Legacy(uuid));
        }

        let mut parts = s.rsplitn(3, '_');
        let (Some(time), Some(date), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let is_digits = |part: &str, len: usize| {
            part.len() == len && part.chars().all(|c| c.is_ascii_digit())
        };
        if name.is_empty() || !name.chars().all(is_name_char) {
            return Err(invalid());
        }
        if !is_digits(date, 8) || !is_digits(time, 6) {
            return Err(invalid());
        }

        let taken_at = NaiveDateTime::parse_from_str(&format!("{date}_{time}"), TIMESTAMP_FORMAT)
            .map_err(|_| invalid())?;

        Ok(Self::Structured {
            workspace: name.to_string(),
            taken_at,
        })
    }
}

use vecsync_core::{SyncError, SyncResult};

/// 校验SQL标识符
///
/// 表名和主键列名来自任务配置，会被拼进语句文本，因此只放行
/// ASCII字母/数字/下划线，且不能以数字开头。数值参数直接内联，
/// 其余一律走参数绑定。
pub fn validate_identifier(ident: &str) -> SyncResult<()> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SyncError::Configuration(format!("非法SQL标识符: {ident}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("user_profile_v2").is_ok());
        assert!(validate_identifier("_internal").is_ok());
    }

    #[test]
    fn test_rejects_injection_shapes() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1users").is_err());
        assert!(validate_identifier("users; DROP TABLE users").is_err());
        assert!(validate_identifier("users--").is_err());
        assert!(validate_identifier("us ers").is_err());
        assert!(validate_identifier("用户表").is_err());
    }
}

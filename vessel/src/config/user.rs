//! User resolution (§4.1). Implements the five-way precedence order over
//! `--user`, `--uid`, `--gid` and the image's declared user exactly as
//! specified; supplemental groups are computed independently of which
//! branch selects the user.

use super::types::User;

/// Resolves the effective user and supplemental groups from CLI flags and
/// the image's declared default user, per §4.1's precedence order.
pub fn resolve_user(
    user_string: Option<&str>,
    uid: Option<u32>,
    gid: Option<u32>,
    image_user: Option<&str>,
) -> (User, Vec<u32>) {
    let default_user = match image_user {
        Some(u) if !u.is_empty() => User::Raw(u.to_string()),
        _ => User::Id(0, 0),
    };

    let user = match (user_string, uid, gid) {
        (Some(u), _, _) if !u.is_empty() => User::Raw(u.to_string()),
        (_, Some(uid), Some(gid)) => User::Id(uid, gid),
        (_, None, None) => default_user,
        (_, Some(uid), None) => User::Raw(uid.to_string()),
        (_, None, Some(_)) => default_user,
    };

    let mut groups = Vec::new();
    if user_string.map(str::is_empty).unwrap_or(true) && uid.is_none() {
        if let Some(gid) = gid {
            groups.push(gid);
        }
    }

    (user, groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_user_string_wins() {
        let (user, groups) = resolve_user(Some("alice"), Some(1000), Some(1000), Some("nobody"));
        assert_eq!(user, User::Raw("alice".into()));
        assert!(groups.is_empty());
    }

    #[test]
    fn uid_and_gid_present() {
        let (user, groups) = resolve_user(None, Some(1000), Some(1000), Some("nobody"));
        assert_eq!(user, User::Id(1000, 1000));
        assert!(groups.is_empty());
    }

    #[test]
    fn neither_present_falls_back_to_image_user() {
        let (user, _) = resolve_user(None, None, None, Some("nobody"));
        assert_eq!(user, User::Raw("nobody".into()));
    }

    #[test]
    fn neither_present_and_no_image_user_defaults_to_root() {
        let (user, _) = resolve_user(None, None, None, None);
        assert_eq!(user, User::Id(0, 0));
    }

    #[test]
    fn only_uid_present() {
        // §8 scenario 7
        let (user, groups) = resolve_user(None, Some(1000), None, Some("nobody"));
        assert_eq!(user, User::Raw("1000".into()));
        assert!(groups.is_empty());
    }

    #[test]
    fn only_gid_present_adds_supplemental_group() {
        let (user, groups) = resolve_user(None, None, Some(2000), Some("nobody"));
        assert_eq!(user, User::Raw("nobody".into()));
        assert_eq!(groups, vec![2000]);
    }
}

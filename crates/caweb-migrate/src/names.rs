//! Deterministic database object names derived from schema versions.

use caweb_version::SemVer;

/// Role that may create schemas, roles, and extensions.
pub const ADMIN_ROLE: &str = "caweb_admin";
/// Role that owns the application tables.
pub const NORMAL_ROLE: &str = "caweb";

/// An effective role name, with the optional per-deployment suffix applied.
pub fn role_name(base: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{base}{suffix}"),
        None => base.to_owned(),
    }
}

/// The authoritative schema for a schema major.
pub fn target_schema(major: u32) -> String {
    format!("caweb{major}")
}

/// The foreign server pointing at a source database of the given version.
pub fn foreign_server(version: SemVer) -> String {
    format!("fps{}_{}", version.major, version.minor)
}

/// The schema that source tables are imported into over the foreign server.
pub fn foreign_schema(version: SemVer) -> String {
    format!("fdw{}_{}", version.major, version.minor)
}

/// The intermediate schema holding the views for one major along the walk.
pub fn intermediate_schema(major: u32) -> String {
    format!("mig{major}")
}

/// The ordered list of schemas touched by a migration from `src` to the
/// destination major, ending with the authoritative destination schema.
///
/// The walk between majors uses a signed step so the list is correct in
/// both directions.
pub fn migration_path(src: SemVer, dst_major: u32) -> Vec<String> {
    let step: i64 = if dst_major >= src.major { 1 } else { -1 };

    let mut names = vec![foreign_schema(src)];
    let mut major = src.major as i64;
    loop {
        names.push(intermediate_schema(major as u32));
        if major == dst_major as i64 {
            break;
        }
        major += step;
    }
    names.push(target_schema(dst_major));

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_deterministic() {
        assert_eq!(target_schema(2), "caweb2");
        assert_eq!(foreign_server(SemVer::new(1, 3, 9)), "fps1_3");
        assert_eq!(foreign_schema(SemVer::new(1, 3, 9)), "fdw1_3");
        assert_eq!(intermediate_schema(1), "mig1");
    }

    #[test]
    fn role_names_take_an_optional_suffix() {
        assert_eq!(role_name(NORMAL_ROLE, None), "caweb");
        assert_eq!(role_name(NORMAL_ROLE, Some("_t7")), "caweb_t7");
        assert_eq!(role_name(ADMIN_ROLE, Some("_t7")), "caweb_admin_t7");
    }

    #[test]
    fn upward_path_lists_every_schema_in_order() {
        assert_eq!(
            migration_path(SemVer::new(1, 0, 0), 2),
            ["fdw1_0", "mig1", "mig2", "caweb2"]
        );
    }

    #[test]
    fn downward_path_walks_backwards() {
        assert_eq!(
            migration_path(SemVer::new(2, 1, 0), 1),
            ["fdw2_1", "mig2", "mig1", "caweb1"]
        );
    }

    #[test]
    fn same_major_path_is_minimal() {
        assert_eq!(
            migration_path(SemVer::new(2, 0, 3), 2),
            ["fdw2_0", "mig2", "caweb2"]
        );
    }
}

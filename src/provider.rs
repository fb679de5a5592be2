//! The provider seam between the database and its data sources.
//!
//! A provider represents one mime directory (binary cache or XML definition
//! files) or one in-memory definition blob. The database owns an ordered
//! list of providers and runs every query across all of them, earlier
//! providers taking precedence.

use crate::glob_match::GlobMatchResult;
use crate::mime_type::MimeTypeData;
use rustc_hash::FxHashSet;

/// One source of mime definitions.
///
/// Methods take `&mut self` because providers load lazily: the binary cache
/// provider reads its companion files on first use, and both kinds
/// revalidate on a forced rebuild.
///
/// `excluded` parameters carry the names already defined by
/// higher-precedence providers; matches for those names must be suppressed
/// so that an overriding definition fully replaces the overridden one.
pub(crate) trait MimeProvider: Send {
    /// Identity used to reuse provider state across rebuilds: the
    /// directory path, or the registration id of a definition blob.
    fn key(&self) -> &str;

    /// Whether the backing data is present and well-formed.
    fn is_valid(&self) -> bool;

    /// Revalidates backing files after a forced rebuild. Providers with no
    /// file state keep the default no-op.
    fn ensure_loaded(&mut self) {}

    /// Whether this provider defines `name`.
    fn knows_mime_type(&mut self, name: &str) -> bool;

    /// Collects the names this provider defines, for building the
    /// exclusion sets of lower-precedence providers.
    fn collect_defined_names(&mut self, into: &mut FxHashSet<String>);

    /// Runs `file_name` against this provider's glob patterns.
    fn add_file_name_matches(
        &mut self,
        file_name: &str,
        result: &mut GlobMatchResult,
        excluded: &FxHashSet<String>,
    );

    /// Runs `data` against this provider's magic rules. A hit with a
    /// priority strictly greater than `*accuracy` replaces `candidate`.
    fn find_by_magic(
        &mut self,
        data: &[u8],
        accuracy: &mut i32,
        candidate: &mut Option<String>,
        excluded: &FxHashSet<String>,
    );

    /// Appends the direct parents of `name` (deduplicated by the caller).
    fn add_parents(&mut self, name: &str, parents: &mut Vec<String>);

    /// The canonical name `name` is an alias of, if this provider says so.
    fn resolve_alias(&mut self, name: &str) -> Option<String>;

    /// Appends the aliases this provider declares for canonical `name`.
    fn add_aliases(&mut self, name: &str, aliases: &mut Vec<String>);

    /// Appends every name this provider defines.
    fn add_all_mime_types(&mut self, names: &mut Vec<String>);

    /// Fills comments, icons and raw glob patterns for `data.name`.
    /// Returns true once the record is complete (stops the provider walk).
    fn load_mime_type_data(&mut self, data: &mut MimeTypeData) -> bool;

    /// Explicit `icon` for `name`, if declared.
    fn icon_name(&mut self, name: &str) -> Option<String>;

    /// Explicit `generic-icon` for `name`, if declared.
    fn generic_icon_name(&mut self, name: &str) -> Option<String>;
}

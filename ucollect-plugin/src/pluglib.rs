//! Static pluglib exports/imports and the resolution rules that bind them.
//!
//! The function-pointer plumbing mirrors the original's type-erased
//! `void(*)(void)` cast exactly — both sides agree on a real signature out
//! of band, and resolution is just name + (optional) prototype-string
//! matching. Unlike the original, resolution here is a pure function
//! (returns resolved pointers rather than writing through them), which is
//! what gives us "check" and "commit" for free: checking is just calling
//! `resolve_functions` and discarding the result.

use thiserror::Error;

/// Type-erased function pointer, cast back to the real signature by the
/// plugin that declared the import (the one place in this crate an
/// `unsafe` transmute is unavoidable, same seam the original casts
/// through).
pub type PluglibFn = usize;

#[derive(Clone, Copy)]
pub struct PluglibExport {
    pub name: &'static str,
    pub function: PluglibFn,
    pub prototype: Option<&'static str>,
}

pub struct Pluglib {
    pub name: &'static str,
    pub compat: u64,
    pub version: u64,
    pub exports: &'static [PluglibExport],
}

pub struct PluglibImport {
    pub name: &'static str,
    pub prototype: Option<&'static str>,
}

#[derive(Debug, Error)]
pub enum PluglibResolveError {
    #[error("could not find function {0}")]
    Unresolved(&'static str),
}

/// Resolve every import in order against `libraries`, taking the first
/// matching export whose prototype is compatible (either side missing a
/// prototype is treated as a wildcard match). Fails fast: the first
/// unresolved import aborts the whole batch, matching "all imports must
/// resolve before anything links".
pub fn resolve_functions(
    libraries: &[&Pluglib],
    imports: &[PluglibImport],
) -> Result<Vec<PluglibFn>, PluglibResolveError> {
    let mut resolved = Vec::with_capacity(imports.len());
    for import in imports {
        let mut found = None;
        'libs: for lib in libraries {
            for export in lib.exports {
                if export.name != import.name {
                    continue;
                }
                let proto_matches = export.prototype.is_none()
                    || import.prototype.is_none()
                    || export.prototype == import.prototype;
                if proto_matches {
                    found = Some(export.function);
                    break 'libs;
                }
                tracing::warn!(
                    function = import.name,
                    exported = export.prototype,
                    imported = import.prototype,
                    "pluglib prototype mismatch"
                );
            }
        }
        match found {
            Some(f) => resolved.push(f),
            None => return Err(PluglibResolveError::Unresolved(import.name)),
        }
    }
    Ok(resolved)
}

/// Verify every import resolves without producing the resolved pointers —
/// the "check, don't link yet" half of a reload.
pub fn check_functions(libraries: &[&Pluglib], imports: &[PluglibImport]) -> bool {
    resolve_functions(libraries, imports).is_ok()
}

/// A pluglib actually loaded (statically registered) into the process,
/// tagged with a content identity for the compatible-replacement rule.
pub struct LoadedPluglib {
    pub lib: Pluglib,
    pub identity: [u8; 32],
}

pub struct PluglibRequest {
    pub name: &'static str,
    pub compat: u64,
    pub version: u64,
}

/// Pick which loaded pluglib satisfies `request`. Prefers the exact
/// previously-bound instance (by content identity) if it's still loaded —
/// carrying a plugin across a reconfiguration should not silently rebind
/// it to a different pluglib build that happens to have the same name.
/// Failing that, picks the highest-versioned loaded library with a
/// matching name and compat level whose version is at least what was
/// requested.
pub fn select_pluglib<'a>(
    loaded: &'a [LoadedPluglib],
    previous_identity: Option<&[u8; 32]>,
    request: &PluglibRequest,
) -> Option<&'a LoadedPluglib> {
    if let Some(prev) = previous_identity {
        if let Some(exact) = loaded.iter().find(|l| &l.identity == prev) {
            return Some(exact);
        }
    }
    loaded
        .iter()
        .filter(|l| {
            l.lib.name == request.name && l.lib.compat == request.compat && l.lib.version >= request.version
        })
        .max_by_key(|l| l.lib.version)
}

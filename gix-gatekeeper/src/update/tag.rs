//! Rules for annotated and lightweight tags.

use crate::classify::{Category, UpdateVariant};
use crate::config::PolicyConfig;
use crate::refs::{ChangeKind, RefMutation};
use crate::{Error, Rejection, Verdict};

/// Validate a tag `mutation`.
///
/// Tags may be deleted freely. Annotated tags may be created but not moved, lightweight tags
/// are only accepted with `hooks.allow-lightweight-tag`.
pub fn validate(
    config: &PolicyConfig,
    variant: UpdateVariant,
    mutation: &RefMutation,
) -> Result<Verdict<Option<String>>, Error> {
    let refname = mutation.name();
    Ok(match (variant.category, variant.change) {
        (_, ChangeKind::Delete) => {
            tracing::debug!(refname, "tag deletion");
            Ok(None)
        }
        (Category::LightweightTag, _) if !config.allow_lightweight_tag => Err(Rejection::from_lines([
            format!("Lightweight tags ({refname}) are not allowed in this repository."),
            "Use 'git tag -a' to create an annotated tag instead.".to_owned(),
        ])),
        (Category::AnnotatedTag, ChangeKind::Update) => Err(Rejection::from_lines([
            format!("Updating the tag {refname} is not allowed."),
            "If the tag really needs to move, delete it first and push it again.".to_owned(),
        ])),
        _ => Ok(None),
    })
}

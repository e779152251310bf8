use crate::{
    error::StoreError,
    models::{Product, ProductDraft},
    store::ProductStore,
};

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Product),
    Updated(Product),
}

#[cfg(test)]
impl UpsertOutcome {
    fn product(&self) -> &Product {
        match self {
            UpsertOutcome::Created(p) | UpsertOutcome::Updated(p) => p,
        }
    }

    fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Create-if-absent-else-update keyed by `draft.name`.
///
/// Lookup and write are two separate store calls; overlapping runs on the same
/// names may interleave between them.
pub async fn upsert(
    store: &dyn ProductStore,
    draft: &ProductDraft,
) -> Result<UpsertOutcome, StoreError> {
    match store.find_by_name(&draft.name).await? {
        Some(existing) => {
            let product = store.update(&existing, draft).await?;
            Ok(UpsertOutcome::Updated(product))
        }
        None => {
            let product = store.create(draft).await?;
            Ok(UpsertOutcome::Created(product))
        }
    }
}

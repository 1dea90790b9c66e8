//! # Smart-Document Comments
//!
//! Comments form threads of depth two: a root comment and a flat list of
//! replies. A reply to a reply is attached to the thread's root. Deleting a
//! root removes the whole thread. Only the author may edit or delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kabal_core::{KommentarId, NavIdent};

use crate::error::DokumentError;

/// The author of a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KommentarForfatter {
    /// Employee ident.
    pub ident: NavIdent,
    /// Display name.
    pub navn: String,
}

/// A comment on a smart document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kommentar {
    /// Comment identity.
    pub id: KommentarId,
    /// The thread root, or `None` for a root comment.
    pub parent_id: Option<KommentarId>,
    /// Who wrote it.
    pub author: KommentarForfatter,
    /// Comment text.
    pub text: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last edit time.
    pub modified: DateTime<Utc>,
}

impl Kommentar {
    /// Whether this comment starts a thread.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

fn require_text(text: &str) -> Result<(), DokumentError> {
    if text.trim().is_empty() {
        return Err(DokumentError::invalid("text", "comment text must not be blank"));
    }
    Ok(())
}

fn find(kommentarer: &[Kommentar], id: KommentarId) -> Result<&Kommentar, DokumentError> {
    kommentarer
        .iter()
        .find(|k| k.id == id)
        .ok_or(DokumentError::KommentarNotFound { kommentar_id: id })
}

fn require_author(kommentar: &Kommentar, ident: &NavIdent) -> Result<(), DokumentError> {
    if &kommentar.author.ident != ident {
        return Err(DokumentError::NotKommentarAuthor {
            kommentar_id: kommentar.id,
            ident: ident.clone(),
        });
    }
    Ok(())
}

pub(crate) fn add(
    kommentarer: &mut Vec<Kommentar>,
    parent_id: Option<KommentarId>,
    author: KommentarForfatter,
    text: String,
) -> Result<KommentarId, DokumentError> {
    require_text(&text)?;
    let root = match parent_id {
        Some(parent_id) => {
            let parent = find(kommentarer, parent_id)?;
            Some(parent.parent_id.unwrap_or(parent.id))
        }
        None => None,
    };
    let now = Utc::now();
    let id = KommentarId::new();
    kommentarer.push(Kommentar {
        id,
        parent_id: root,
        author,
        text,
        created: now,
        modified: now,
    });
    Ok(id)
}

pub(crate) fn edit(
    kommentarer: &mut [Kommentar],
    id: KommentarId,
    ident: &NavIdent,
    text: String,
) -> Result<(), DokumentError> {
    require_text(&text)?;
    let kommentar = kommentarer
        .iter_mut()
        .find(|k| k.id == id)
        .ok_or(DokumentError::KommentarNotFound { kommentar_id: id })?;
    require_author(kommentar, ident)?;
    kommentar.text = text;
    kommentar.modified = Utc::now();
    Ok(())
}

/// Returns the number of comments removed.
pub(crate) fn delete(
    kommentarer: &mut Vec<Kommentar>,
    id: KommentarId,
    ident: &NavIdent,
) -> Result<usize, DokumentError> {
    let kommentar = find(kommentarer, id)?;
    require_author(kommentar, ident)?;
    let before = kommentarer.len();
    if kommentar.is_root() {
        kommentarer.retain(|k| k.id != id && k.parent_id != Some(id));
    } else {
        kommentarer.retain(|k| k.id != id);
    }
    Ok(before - kommentarer.len())
}

/// Group comments into threads, each root followed by its replies in
/// creation order.
pub fn threads(kommentarer: &[Kommentar]) -> Vec<(&Kommentar, Vec<&Kommentar>)> {
    kommentarer
        .iter()
        .filter(|k| k.is_root())
        .map(|root| {
            let replies = kommentarer
                .iter()
                .filter(|k| k.parent_id == Some(root.id))
                .collect();
            (root, replies)
        })
        .collect()
}

use crate::error::FetchFailure;
use crate::history::model::{ChatRef, Page};

/// One bounded request for up to `page_size` messages older than `cursor`.
///
/// Implementations return messages newest-first and classify every failure,
/// timeouts included, as [`FetchFailure::Transient`] or
/// [`FetchFailure::Permanent`].
pub trait PageFetcher {
    fn fetch(
        &self,
        chat: &ChatRef,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, FetchFailure>;

    /// Total message count of the chat, when the API can tell.
    fn message_count(&self, _chat: &ChatRef) -> Result<Option<u64>, FetchFailure> {
        Ok(None)
    }
}

impl<T: PageFetcher + ?Sized> PageFetcher for &T {
    fn fetch(
        &self,
        chat: &ChatRef,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, FetchFailure> {
        (**self).fetch(chat, cursor, page_size)
    }

    fn message_count(&self, chat: &ChatRef) -> Result<Option<u64>, FetchFailure> {
        (**self).message_count(chat)
    }
}

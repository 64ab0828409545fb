//! Cross-backend title database (§4.9): combines the per-backend [`SwitchFs`]
//! graphs built from built-in system/user storage, the SD card, and an
//! inserted game cartridge into a single queryable view.
//!
//! Each backend is independently optional and independently fallible — a
//! content-meta enumeration that fails on one backend is logged and the
//! database is built from whatever backends succeeded (matching how a real
//! content-meta-index call can come back empty for an absent SD card or
//! cartridge without that being fatal for the others).

use crate::crypto::keyset::KeySet;
use crate::filesystem::ReadableFileSystem;
use crate::ids::ApplicationId;
use crate::switch_fs::{AnyContentInfo, Application, NewSwitchFsError, SwitchFs};
use tracing::warn;

/// Which physical storage a [`SwitchFs`] was enumerated from. This is the
/// *backend* a title's metadata was read from, not the content's own
/// `StorageId` field (which records where a piece of content physically
/// lives and can differ from the backend that reported it, e.g. a patch
/// installed to the SD card for a game whose base data sits on the
/// cartridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Backend {
    BuiltInSystem,
    BuiltInUser,
    Sd,
    GameCard,
}

/// One title's content-meta record as seen from a particular backend.
#[derive(Debug, Clone, Copy)]
pub struct TitleInfo<'a> {
    pub backend: Backend,
    pub content: &'a AnyContentInfo,
}

impl<'a> TitleInfo<'a> {
    pub fn title_id(&self) -> u64 {
        self.content.content_meta_key().id.value()
    }
}

/// `{app, [patches], [add_ons]}` for one application, resolved from whichever
/// backend installed it.
#[derive(Debug)]
pub struct ApplicationSetView<'a> {
    pub backend: Backend,
    pub application: &'a Application,
}

fn open_backend<F: ReadableFileSystem>(
    backend: Backend,
    key_set: &KeySet,
    fs: Option<&F>,
) -> Option<SwitchFs<F>> {
    let fs = fs?;
    match SwitchFs::new(key_set, fs) {
        Ok(switch_fs) => Some(switch_fs),
        Err(err) => {
            log_open_failure(backend, &err);
            None
        }
    }
}

fn log_open_failure(backend: Backend, err: &NewSwitchFsError) {
    warn!("Failed to enumerate title database backend {backend:?}: {err}");
}

/// Aggregates up to one [`SwitchFs`] per backend. Each backend has its own
/// filesystem type parameter since built-in storage, the SD card and a
/// gamecard are backed by entirely different `ReadableFileSystem`
/// implementations.
pub struct TitleDatabase<Fs, Fu, Fd, Fg>
where
    Fs: ReadableFileSystem,
    Fu: ReadableFileSystem,
    Fd: ReadableFileSystem,
    Fg: ReadableFileSystem,
{
    built_in_system: Option<SwitchFs<Fs>>,
    built_in_user: Option<SwitchFs<Fu>>,
    sd: Option<SwitchFs<Fd>>,
    gamecard: Option<SwitchFs<Fg>>,
}

impl<Fs, Fu, Fd, Fg> TitleDatabase<Fs, Fu, Fd, Fg>
where
    Fs: ReadableFileSystem,
    Fu: ReadableFileSystem,
    Fd: ReadableFileSystem,
    Fg: ReadableFileSystem,
{
    /// Builds the database from whichever backends are present. Pass `None`
    /// for a backend that isn't available right now (no SD card, no
    /// cartridge inserted); a present backend whose enumeration fails is
    /// logged and treated the same as absent.
    pub fn build(
        key_set: &KeySet,
        built_in_system: Option<&Fs>,
        built_in_user: Option<&Fu>,
        sd: Option<&Fd>,
        gamecard: Option<&Fg>,
    ) -> Self {
        Self {
            built_in_system: open_backend(Backend::BuiltInSystem, key_set, built_in_system),
            built_in_user: open_backend(Backend::BuiltInUser, key_set, built_in_user),
            sd: open_backend(Backend::Sd, key_set, sd),
            gamecard: open_backend(Backend::GameCard, key_set, gamecard),
        }
    }

    fn backends(&self) -> impl Iterator<Item = (Backend, &dyn BackendView)> {
        [
            self.built_in_system
                .as_ref()
                .map(|fs| (Backend::BuiltInSystem, fs as &dyn BackendView)),
            self.built_in_user
                .as_ref()
                .map(|fs| (Backend::BuiltInUser, fs as &dyn BackendView)),
            self.sd.as_ref().map(|fs| (Backend::Sd, fs as &dyn BackendView)),
            self.gamecard
                .as_ref()
                .map(|fs| (Backend::GameCard, fs as &dyn BackendView)),
        ]
        .into_iter()
        .flatten()
    }

    /// All title-meta records across every backend sharing the given raw
    /// title id (application, its patches, its add-ons and data-patches all
    /// share the application's id in different fields, so this only matches
    /// records whose *own* content-meta key carries `id`, not related ones —
    /// use [`Self::application_set`] to pull in the whole family).
    pub fn by_title_id(&self, id: u64) -> Vec<TitleInfo<'_>> {
        self.backends()
            .flat_map(|(backend, view)| {
                view.titles_with_id(id)
                    .into_iter()
                    .map(move |content| TitleInfo { backend, content })
            })
            .collect()
    }

    /// Resolves an application and its patch/add-on family, searching
    /// backends in system -> user -> sd -> gamecard priority order and
    /// returning the first match (an application is expected to be
    /// enumerated from exactly one backend at a time).
    pub fn application_set(&self, app_id: ApplicationId) -> Option<ApplicationSetView<'_>> {
        self.backends().find_map(|(backend, view)| {
            view.application(app_id)
                .map(|application| ApplicationSetView {
                    backend,
                    application,
                })
        })
    }

    /// Applications enumerated from an inserted game cartridge.
    pub fn gamecard_applications(&self) -> Vec<&Application> {
        self.gamecard
            .as_ref()
            .map(|fs| fs.application_set().values().collect())
            .unwrap_or_default()
    }
}

/// Object-safe sliver of [`SwitchFs`]'s query surface, used so
/// [`TitleDatabase::backends`] can iterate over four differently-typed
/// `SwitchFs<F>` fields uniformly.
trait BackendView {
    fn titles_with_id(&self, id: u64) -> Vec<&AnyContentInfo>;
    fn application(&self, app_id: ApplicationId) -> Option<&Application>;
}

impl<F: ReadableFileSystem> BackendView for SwitchFs<F> {
    fn titles_with_id(&self, id: u64) -> Vec<&AnyContentInfo> {
        self.title_set()
            .values()
            .filter(|content| content.content_meta_key().id.value() == id)
            .collect()
    }

    fn application(&self, app_id: ApplicationId) -> Option<&Application> {
        self.application_set().get(&app_id)
    }
}

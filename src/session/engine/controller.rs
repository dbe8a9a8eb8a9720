//! Session orchestration.
//!
//! One exchange runs at a time: the budget is checked (splitting into a fresh titled
//! conversation when it overflows), the reply is streamed while a title resolves in the
//! background for brand-new conversations, and the result is committed to history only
//! once every step has succeeded.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::llm::openai_client::OpenAiClient;
use crate::llm::service::CompletionService;
use crate::session::core::config::ChatConfig;
use crate::session::core::errors::{ChatError, ChatResult};
use crate::session::core::message::{Conversation, Message, strip_system};
use crate::session::engine::events::{SessionEvent, SessionState};
use crate::session::retrieval::search_index::SearchIndex;
use crate::session::storage::history_store::HistoryStore;
use crate::session::storage::sqlite_store::{ConversationStore, SqliteConversationStore};
use crate::session::title::resolver::{PendingTitle, TitleResolver, clean_title};
use crate::session::title::suffix::{derive_next_title, unique_title};
use crate::session::tokens::counter::TokenCounter;
use crate::session::tokens::encoding::{PieceTokenizer, Tokenizer};

/// External collaborators of the controller.
pub struct SessionBackends {
    /// Completion service for replies and titles.
    pub service: Arc<dyn CompletionService>,
    /// Persistent conversation records.
    pub store: Arc<dyn ConversationStore>,
    /// Encoded-length service for budget checks.
    pub tokenizer: Arc<dyn Tokenizer>,
}

impl SessionBackends {
    /// Build the OpenAI client, the `SQLite` store at the configured path, and the bundled
    /// tokenizer.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn sqlite(config: &ChatConfig) -> ChatResult<Self> {
        let service = Arc::new(OpenAiClient::new(&config.service)?);
        let store = Arc::new(SqliteConversationStore::open(&config.storage.db_path()).await?);
        let tokenizer = Arc::new(PieceTokenizer::new()?);

        Ok(Self {
            service,
            store,
            tokenizer,
        })
    }
}

/// Result of a submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// Blank input, or input arriving while an exchange is in flight.
    Ignored,
    /// The exchange completed and was saved.
    Committed {
        /// Title the conversation is stored under.
        title: String,
        /// Full assistant reply.
        reply: String,
    },
}

/// The conversation being edited.
#[derive(Default)]
struct Session {
    title: Option<String>,
    /// Chronological messages, never including the system message.
    messages: Vec<Message>,
    is_new: bool,
    pending_title: Option<PendingTitle>,
}

impl Session {
    fn fresh() -> Self {
        Self {
            is_new: true,
            ..Self::default()
        }
    }
}

/// Request ready to send.
struct Prepared {
    messages: Vec<Message>,
    split_title: Option<String>,
}

/// Drives exchanges and owns the conversation history.
pub struct SessionController {
    config: ChatConfig,
    service: Arc<dyn CompletionService>,
    counter: TokenCounter,
    titles: TitleResolver,
    history: HistoryStore,
    events: mpsc::UnboundedSender<SessionEvent>,
    session: Option<Session>,
    state: SessionState,
}

impl SessionController {
    /// Create a controller and the receiver for its events.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the history cannot be loaded.
    pub async fn new(
        config: ChatConfig,
        backends: SessionBackends,
    ) -> ChatResult<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        config.validate()?;
        let history = HistoryStore::load(backends.store).await?;
        let (events, receiver) = mpsc::unbounded_channel();

        let controller = Self {
            counter: TokenCounter::new(backends.tokenizer),
            titles: TitleResolver::new(Arc::clone(&backends.service)),
            service: backends.service,
            config,
            history,
            events,
            session: None,
            state: SessionState::Idle,
        };
        Ok((controller, receiver))
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a submission would be accepted now.
    #[must_use]
    pub const fn accepts_input(&self) -> bool {
        self.state.accepts_input()
    }

    /// Title of the selected conversation, once it has one.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.session.as_ref().and_then(|session| session.title.as_deref())
    }

    /// Messages of the selected conversation, without the system message.
    #[must_use]
    pub fn transcript(&self) -> &[Message] {
        self.session
            .as_ref()
            .map_or(&[], |session| session.messages.as_slice())
    }

    /// Stored conversations.
    #[must_use]
    pub const fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Stored titles, most recent first.
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.history.titles()
    }

    /// Titles matching `query`, most relevant first. A blank query lists every title.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<String> {
        let titles = self.history.titles();
        if query.trim().is_empty() {
            return titles;
        }
        SearchIndex::build(&titles)
            .search(query)
            .into_iter()
            .filter_map(|index| titles.get(index).cloned())
            .collect()
    }

    /// Drop the selected conversation. An outstanding title request is abandoned.
    pub fn new_chat(&mut self) {
        self.session = None;
        self.emit(SessionEvent::TranscriptCleared);
        self.set_state(SessionState::Idle);
    }

    /// Select a stored conversation for continuation.
    ///
    /// # Errors
    /// Returns [`ChatError::NotFound`] if no conversation has this title.
    pub fn open(&mut self, title: &str) -> ChatResult<()> {
        let conversation = self
            .history
            .get(title)
            .ok_or_else(|| ChatError::NotFound(title.to_string()))?;

        self.session = Some(Session {
            title: Some(title.to_string()),
            messages: conversation.messages.clone(),
            is_new: false,
            pending_title: None,
        });
        self.emit(SessionEvent::TranscriptCleared);
        self.set_state(SessionState::Composing);
        Ok(())
    }

    /// Rename a stored conversation.
    ///
    /// # Errors
    /// Returns [`ChatError::EmptyTitle`], [`ChatError::Conflict`], [`ChatError::NotFound`],
    /// or a persistence error; nothing changes in any error case.
    pub async fn rename(&mut self, old_title: &str, new_title: &str) -> ChatResult<()> {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return Err(ChatError::EmptyTitle);
        }

        self.history.rename(old_title, new_title).await?;
        if let Some(session) = self.session.as_mut()
            && session.title.as_deref() == Some(old_title)
        {
            session.title = Some(new_title.to_string());
        }
        info!("Renamed {old_title:?} to {new_title:?}");
        Ok(())
    }

    /// Delete a stored conversation; deleting the selected one starts a new chat.
    ///
    /// # Errors
    /// Returns a persistence error if the record cannot be removed.
    pub async fn delete(&mut self, title: &str) -> ChatResult<()> {
        self.history.delete(title).await?;
        if self.title() == Some(title) {
            self.new_chat();
        }
        info!("Deleted {title:?}");
        Ok(())
    }

    /// Send `content` as the next user message and stream the reply.
    ///
    /// Blank input is ignored. On failure nothing is persisted and the session is left as
    /// it was before the submission, apart from a title request that is still pending.
    ///
    /// # Errors
    /// Returns the error that aborted the exchange; it is also reported as
    /// [`SessionEvent::Failed`].
    pub async fn submit(&mut self, content: &str) -> ChatResult<SubmitOutcome> {
        if content.trim().is_empty() || !self.accepts_input() {
            debug!("Ignoring submission in state {}", self.state);
            return Ok(SubmitOutcome::Ignored);
        }
        self.set_state(SessionState::Composing);

        let mut session = self.session.take().unwrap_or_else(Session::fresh);
        let result = self.exchange(&mut session, content).await;
        self.session = Some(session);
        self.set_state(SessionState::Composing);

        match result {
            Ok((title, reply)) => {
                self.emit(SessionEvent::Committed {
                    title: title.clone(),
                });
                Ok(SubmitOutcome::Committed { title, reply })
            }
            Err(err) => {
                warn!("Exchange aborted: {err}");
                self.emit(SessionEvent::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn exchange(
        &mut self,
        session: &mut Session,
        content: &str,
    ) -> ChatResult<(String, String)> {
        let Prepared {
            mut messages,
            split_title,
        } = self.prepare(session, content)?;

        // Only untitled conversations request a title, and those never split.
        if session.is_new && session.title.is_none() && session.pending_title.is_none() {
            session.pending_title = Some(self.titles.request_title(content));
        }
        let splitting = split_title.is_some();
        self.emit(SessionEvent::UserMessage(content.to_string()));

        self.set_state(SessionState::Dispatching);
        let mut fragments = self.service.stream(messages.clone()).await?;

        self.set_state(SessionState::Streaming);
        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            reply.push_str(&fragment);
            self.emit(SessionEvent::Fragment(fragment));
        }

        self.set_state(SessionState::Committing);
        messages.push(Message::assistant(reply.clone()));
        let title = self.commit_title(session, split_title, content).await?;
        self.history
            .upsert(&title, Conversation::from_exchange(&messages))
            .await?;
        if splitting {
            self.emit(SessionEvent::TranscriptCleared);
        }

        session.title = Some(title.clone());
        session.messages = strip_system(&messages).to_vec();
        session.is_new = false;
        session.pending_title = None;
        Ok((title, reply))
    }

    /// Build the request for `content`, splitting when the budget is exceeded.
    fn prepare(&self, session: &Session, content: &str) -> ChatResult<Prepared> {
        let model = &self.config.service.model;
        let budget = self.config.budget.max_tokens;

        let mut messages = Vec::with_capacity(session.messages.len() + 2);
        messages.push(self.system_message());
        messages.extend(session.messages.iter().cloned());
        messages.push(Message::user(content));

        let tokens = self.counter.estimate(&messages, model)?;
        if tokens <= budget {
            return Ok(Prepared {
                messages,
                split_title: None,
            });
        }

        let Some(old_title) = session.title.as_deref() else {
            return Err(ChatError::ContextOverflow { tokens, budget });
        };
        let split = vec![
            self.system_message(),
            Message::user(format!("{old_title}: {content}")),
        ];
        let split_tokens = self.counter.estimate(&split, model)?;
        if split_tokens > budget {
            return Err(ChatError::ContextOverflow {
                tokens: split_tokens,
                budget,
            });
        }

        let next = derive_next_title(old_title);
        info!("Context of {tokens} tokens exceeds {budget}; continuing as {next:?}");
        Ok(Prepared {
            messages: split,
            split_title: Some(next),
        })
    }

    /// Title to commit under. New titles never collide with another stored conversation.
    async fn commit_title(
        &self,
        session: &mut Session,
        split_title: Option<String>,
        seed: &str,
    ) -> ChatResult<String> {
        if let Some(next) = split_title {
            return Ok(unique_title(next, |title| self.history.contains(title)));
        }
        if let Some(title) = &session.title {
            return Ok(title.clone());
        }

        let resolved = match session.pending_title.take() {
            Some(pending) => pending.wait().await?,
            None => clean_title("", seed),
        };
        let title = unique_title(resolved, |title| self.history.contains(title));
        session.title = Some(title.clone());
        Ok(title)
    }

    fn system_message(&self) -> Message {
        Message::system(self.config.budget.system_message.clone())
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No event receiver");
        }
    }
}

//! An in-memory [`Transaction`] for exercising the bridge without a PAM
//! stack.
//!
//! Plays the framework's part: items, a scripted conversation callback, an
//! ordered environment list, the handle-scoped data store, and an explicit
//! [`FakeTransaction::finish`] standing in for the framework's end-of-
//! transaction teardown.  Diagnostics land in a [`MemorySink`] so tests can
//! assert on log lines.

use crate::diag::{LogSink, MemorySink};
use crate::host::ScriptHost;
use crate::lock;
use crate::txn::{ConvReply, Item, Transaction};
use crate::values::{Message, XAuthData};
use crate::consts;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type ConvHandler = Box<dyn FnMut(&[Message]) -> Result<Vec<ConvReply>, i32> + Send>;

#[derive(Default)]
pub struct FakeTransaction {
    items: Mutex<HashMap<i32, String>>,
    xauth: Mutex<Option<XAuthData>>,
    /// Insertion-ordered, mirroring the framework's environment list.
    env: Mutex<Vec<(String, String)>>,
    conv: Mutex<Option<ConvHandler>>,
    conv_calls: AtomicUsize,
    delays: Mutex<Vec<u32>>,
    stash: Mutex<HashMap<String, Arc<ScriptHost>>>,
    sink: Arc<MemorySink>,
}

impl FakeTransaction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_item(&self, item: Item, value: &str) {
        lock(&self.items).insert(item.code(), value.to_owned());
    }

    pub fn clear_item(&self, item: Item) {
        lock(&self.items).remove(&item.code());
    }

    pub fn set_xauth(&self, data: XAuthData) {
        *lock(&self.xauth) = Some(data);
    }

    /// Install the application's conversation callback.
    pub fn set_conv(
        &self,
        handler: impl FnMut(&[Message]) -> Result<Vec<ConvReply>, i32> + Send + 'static,
    ) {
        *lock(&self.conv) = Some(Box::new(handler));
    }

    /// A callback that answers every prompt with `text`.
    pub fn answer_with(&self, text: &str) {
        let text = text.to_owned();
        self.set_conv(move |prompts| {
            Ok(prompts
                .iter()
                .map(|_| ConvReply {
                    text: Some(text.clone()),
                    retcode: 0,
                })
                .collect())
        });
    }

    /// How many times the conversation callback has been invoked.
    pub fn conv_calls(&self) -> usize {
        self.conv_calls.load(Ordering::Relaxed)
    }

    pub fn fail_delays(&self) -> Vec<u32> {
        lock(&self.delays).clone()
    }

    pub fn sink(&self) -> Arc<MemorySink> {
        self.sink.clone()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.sink.lines()
    }

    /// The framework's end-of-transaction teardown: run each stashed
    /// adapter's destructor, then drop it.
    pub fn finish(self: &Arc<Self>) {
        let hosts: Vec<Arc<ScriptHost>> = lock(&self.stash).drain().map(|(_, h)| h).collect();
        for host in hosts {
            host.shutdown(self.clone() as Arc<dyn Transaction>);
        }
    }
}

impl Transaction for FakeTransaction {
    fn item(&self, item: Item) -> Result<Option<String>, i32> {
        Ok(lock(&self.items).get(&item.code()).cloned())
    }

    fn xauth_item(&self) -> Result<Option<XAuthData>, i32> {
        Ok(lock(&self.xauth).clone())
    }

    fn user(&self, prompt: Option<&str>) -> Result<Option<String>, i32> {
        if let Some(user) = lock(&self.items).get(&consts::PAM_USER) {
            return Ok(Some(user.clone()));
        }
        let message = Message::new(
            consts::PAM_PROMPT_ECHO_ON,
            prompt.unwrap_or("login: "),
        )
        .map_err(|_| consts::PAM_SYSTEM_ERR)?;
        let replies = self.converse(std::slice::from_ref(&message))?;
        let Some(ConvReply {
            text: Some(user), ..
        }) = replies.into_iter().next()
        else {
            return Err(consts::PAM_CONV_ERR);
        };
        lock(&self.items).insert(consts::PAM_USER, user.clone());
        Ok(Some(user))
    }

    fn fail_delay(&self, micro_sec: u32) -> Result<(), i32> {
        lock(&self.delays).push(micro_sec);
        Ok(())
    }

    fn converse(&self, prompts: &[Message]) -> Result<Vec<ConvReply>, i32> {
        let mut conv = lock(&self.conv);
        let Some(handler) = conv.as_mut() else {
            return Err(consts::PAM_CONV_ERR);
        };
        self.conv_calls.fetch_add(1, Ordering::Relaxed);
        handler(prompts)
    }

    fn getenv(&self, key: &str) -> Option<String> {
        lock(&self.env)
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    }

    fn putenv(&self, entry: &str) -> Result<(), i32> {
        let mut env = lock(&self.env);
        match entry.split_once('=') {
            Some((key, value)) => {
                if key.is_empty() {
                    return Err(consts::PAM_BAD_ITEM);
                }
                match env.iter_mut().find(|(name, _)| name == key) {
                    Some(slot) => slot.1 = value.to_owned(),
                    None => env.push((key.to_owned(), value.to_owned())),
                }
                Ok(())
            }
            // A bare name deletes; deleting an unset name is an error.
            None => {
                let before = env.len();
                env.retain(|(name, _)| name != entry);
                if env.len() == before {
                    Err(consts::PAM_BAD_ITEM)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn env_entries(&self) -> Vec<String> {
        lock(&self.env)
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect()
    }

    fn stash(&self, key: &str, host: Arc<ScriptHost>) -> Result<(), i32> {
        lock(&self.stash).insert(key.to_owned(), host);
        Ok(())
    }

    fn stashed(&self, key: &str) -> Option<Arc<ScriptHost>> {
        lock(&self.stash).get(key).cloned()
    }

    fn log_sink(&self) -> Arc<dyn LogSink> {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn env_is_insertion_ordered_and_last_write_wins() {
        let txn = FakeTransaction::new();
        txn.putenv("B=1").unwrap();
        txn.putenv("A=2").unwrap();
        txn.putenv("B=3").unwrap();
        assert_eq!(txn.getenv("B").as_deref(), Some("3"));
        assert_eq!(txn.env_entries(), vec!["B=3".to_owned(), "A=2".to_owned()]);
    }

    #[test]
    fn deleting_an_unset_name_is_bad_item() {
        let txn = FakeTransaction::new();
        assert_eq!(txn.putenv("GHOST"), Err(consts::PAM_BAD_ITEM));
        txn.putenv("GHOST=1").unwrap();
        assert_eq!(txn.putenv("GHOST"), Ok(()));
        assert_eq!(txn.getenv("GHOST"), None);
    }

    #[test]
    fn missing_conversation_is_conv_err() {
        let txn = FakeTransaction::new();
        let prompt = Message::new(consts::PAM_TEXT_INFO, "hello").unwrap();
        assert_eq!(txn.converse(&[prompt]), Err(consts::PAM_CONV_ERR));
    }

    #[test]
    fn get_user_prompts_once_and_caches() {
        let txn = FakeTransaction::new();
        txn.answer_with("mallory");
        assert_eq!(txn.user(None).unwrap().as_deref(), Some("mallory"));
        assert_eq!(txn.user(None).unwrap().as_deref(), Some("mallory"));
        assert_eq!(txn.conv_calls(), 1);
    }

    proptest! {
        // The environment behaves like an insertion-ordered map under any
        // interleaving of set and delete.
        #[test]
        fn env_matches_an_ordered_map_model(
            ops in prop::collection::vec(
                (prop::sample::select(vec!["K1", "K2", "K3", "K4"]),
                 prop::option::of("[a-z0-9]{0,8}")),
                0..40,
            )
        ) {
            let txn = FakeTransaction::new();
            let mut model: Vec<(String, String)> = Vec::new();
            for (key, value) in ops {
                match value {
                    Some(value) => {
                        let _ = txn.putenv(&format!("{key}={value}"));
                        match model.iter_mut().find(|(k, _)| k == key) {
                            Some(slot) => slot.1 = value,
                            None => model.push((key.to_owned(), value)),
                        }
                    }
                    None => {
                        let _ = txn.putenv(key);
                        model.retain(|(k, _)| k != key);
                    }
                }
            }
            let expect: Vec<String> =
                model.iter().map(|(k, v)| format!("{k}={v}")).collect();
            prop_assert_eq!(txn.env_entries(), expect);
            let model_map: HashMap<_, _> = model.into_iter().collect();
            for key in ["K1", "K2", "K3", "K4"] {
                prop_assert_eq!(txn.getenv(key), model_map.get(key).cloned());
            }
        }
    }
}

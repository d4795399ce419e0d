//! Test doubles for the menu and the keystroke backend.

use crate::menu::{Menu, MenuError};
use keepmenu_core::autotype::{BackendError, TypeBackend};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    answers: VecDeque<Option<String>>,
    passphrases: VecDeque<Option<String>>,
    calls: Vec<(String, Vec<String>)>,
    errors: Vec<String>,
    failure: Option<MenuError>,
}

impl Script {
    /// Running out of answers behaves like pressing escape unless a failure
    /// is armed.
    fn fail(&mut self) -> Result<Option<String>, MenuError> {
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

/// Menu answering from a fixed script. Clones share the same script so a
/// test can keep a handle after moving the menu into a controller.
#[derive(Clone, Default)]
pub struct ScriptedMenu {
    script: Arc<Mutex<Script>>,
}

impl ScriptedMenu {
    pub fn new(answers: impl IntoIterator<Item = Option<String>>) -> Self {
        let menu = Self::default();
        menu.script.lock().unwrap().answers = answers.into_iter().collect();
        menu
    }

    /// Script built from string slices; `""` stands for escape.
    pub fn answering(answers: &[&str]) -> Self {
        Self::new(
            answers
                .iter()
                .map(|a| (!a.is_empty()).then(|| a.to_string())),
        )
    }

    /// Once the scripted answers or passphrases run out, the next call
    /// fails with `err` instead of escaping.
    pub fn fail_when_exhausted(&self, err: MenuError) {
        self.script.lock().unwrap().failure = Some(err);
    }

    pub fn push_passphrase(&self, passphrase: Option<&str>) {
        self.script
            .lock()
            .unwrap()
            .passphrases
            .push_back(passphrase.map(str::to_string));
    }

    /// Every `select` so far as `(prompt, items)`.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|(prompt, _)| prompt).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.script.lock().unwrap().errors.clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().answers.len()
    }
}

impl Menu for ScriptedMenu {
    fn select(&self, prompt: &str, items: &[String]) -> Result<Option<String>, MenuError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((prompt.to_string(), items.to_vec()));
        match script.answers.pop_front() {
            Some(answer) => Ok(answer),
            None => script.fail(),
        }
    }

    fn passphrase(&self) -> Result<Option<String>, MenuError> {
        let mut script = self.script.lock().unwrap();
        match script.passphrases.pop_front() {
            Some(passphrase) => Ok(passphrase),
            None => script.fail(),
        }
    }

    fn error(&self, message: &str) {
        self.script.lock().unwrap().errors.push(message.to_string());
    }
}

/// What a [`RecordingBackend`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stroke {
    Text(String),
    Key(String),
}

/// Keystroke backend that records instead of typing.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    strokes: Arc<Mutex<Vec<Stroke>>>,
}

impl RecordingBackend {
    pub fn strokes(&self) -> Vec<Stroke> {
        self.strokes.lock().unwrap().clone()
    }

    /// Everything typed as text, concatenated.
    pub fn typed(&self) -> String {
        self.strokes()
            .into_iter()
            .filter_map(|stroke| match stroke {
                Stroke::Text(text) => Some(text),
                Stroke::Key(_) => None,
            })
            .collect()
    }
}

impl TypeBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        self.strokes
            .lock()
            .unwrap()
            .push(Stroke::Text(text.to_string()));
        Ok(())
    }

    fn tap_key(&mut self, token: &str) -> Result<(), BackendError> {
        self.strokes
            .lock()
            .unwrap()
            .push(Stroke::Key(token.to_string()));
        Ok(())
    }

    fn is_supported(&self, token: &str) -> bool {
        token != "{APPS}"
    }
}

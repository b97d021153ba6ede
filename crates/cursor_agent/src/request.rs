use std::path::{Path, PathBuf};

/// Spawn parameters for one invocation of cursor-agent.
///
/// The argument order produced by [`argv`](Self::argv) is part of the
/// black-box contract with the agent binary and must not be reordered.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    binary: PathBuf,
    prompt: String,
    resume_session_id: Option<String>,
    model: Option<String>,
    workspace: Option<String>,
    force: bool,
    extra_args: Vec<String>,
}

impl AgentRequest {
    pub fn new(binary: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            prompt: prompt.into(),
            resume_session_id: None,
            model: None,
            workspace: None,
            force: false,
            extra_args: Vec::new(),
        }
    }

    /// Resume a previous session. Empty ids are ignored.
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        self.resume_session_id = (!session_id.is_empty()).then_some(session_id);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = (!model.is_empty()).then_some(model);
        self
    }

    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        let workspace = workspace.into();
        self.workspace = (!workspace.is_empty()).then_some(workspace);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt
    }

    /// The exact argument vector passed to cursor-agent.
    pub fn argv(&self) -> Vec<String> {
        let mut out: Vec<String> = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
        ];

        if let Some(session_id) = self.resume_session_id.as_ref() {
            out.push("--resume".to_string());
            out.push(session_id.clone());
        }

        if self.force {
            out.push("--force".to_string());
        }

        if let Some(model) = self.model.as_ref() {
            out.push("--model".to_string());
            out.push(model.clone());
        }

        if let Some(workspace) = self.workspace.as_ref() {
            out.push("--workspace".to_string());
            out.push(workspace.clone());
        }

        out.extend(self.extra_args.iter().cloned());

        out
    }
}

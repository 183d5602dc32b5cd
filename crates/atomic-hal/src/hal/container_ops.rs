//! Running a command inside a container image (podman-compatible engines).

use crate::HalResult;

/// `<engine> <global_args...> run <run_args...> <image> <command...>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRun {
    pub engine: String,
    /// Engine-level options, e.g. `--root <dir>` to relocate image storage.
    pub global_args: Vec<String>,
    pub run_args: Vec<String>,
    pub image: String,
    pub command: Vec<String>,
}

impl ContainerRun {
    pub fn new(engine: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            global_args: Vec::new(),
            run_args: Vec::new(),
            image: image.into(),
            command: Vec::new(),
        }
    }

    pub fn global_arg(mut self, arg: impl Into<String>) -> Self {
        self.global_args.push(arg.into());
        self
    }

    pub fn run_arg(mut self, arg: impl Into<String>) -> Self {
        self.run_args.push(arg.into());
        self
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argument vector, excluding the engine binary itself.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.global_args.clone();
        argv.push("run".to_string());
        argv.extend(self.run_args.iter().cloned());
        argv.push(self.image.clone());
        argv.extend(self.command.iter().cloned());
        argv
    }
}

pub trait ContainerOps {
    /// Run the container to completion, forwarding each output line to `on_output_line`.
    ///
    /// A non-zero exit is reported as `HalError::CommandFailed` carrying the engine's exit code.
    fn container_run(
        &self,
        run: &ContainerRun,
        on_output_line: &mut dyn FnMut(&str),
    ) -> HalResult<()>;
}

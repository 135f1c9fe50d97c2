//! The two-step external conversion chain.
//!
//! ```text
//! model.usdz ──usdcat──▶ model.usd ──usd2gltf──▶ out/<output>.glb
//!   (input)    step 1   (intermediate)  step 2       (output)
//! ```
//!
//! Argument shapes are fixed; only the program names are configurable:
//!
//! * step 1: `<unpack_tool> <input> --out <intermediate>`
//! * step 2: `<gltf_tool> --input <intermediate> --output <output>`
//!
//! The intermediate is deleted once step 2 succeeds. When step 2 fails it is
//! left in place for diagnosis; the workspace teardown removes it anyway.

use crate::config::ConverterConfig;
use crate::error::{ConversionStep, ConvertError, ExitInfo};
use crate::observer::PipelineObserver;
use crate::pipeline::tools::{ToolCommand, ToolInvoker};
use crate::pipeline::workspace::{AssetStage, StagedAsset, Workspace};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs step 1 and step 2 against a workspace.
#[derive(Clone)]
pub struct StageRunner {
    invoker: Arc<dyn ToolInvoker>,
    unpack_tool: String,
    gltf_tool: String,
    intermediate_extension: String,
}

impl StageRunner {
    pub fn new(invoker: Arc<dyn ToolInvoker>, config: &ConverterConfig) -> Self {
        Self {
            invoker,
            unpack_tool: config.unpack_tool.clone(),
            gltf_tool: config.gltf_tool.clone(),
            intermediate_extension: config.intermediate_extension.clone(),
        }
    }

    /// Convert `input` into `out/<output_filename>` inside `workspace`.
    pub async fn run<'ws>(
        &self,
        workspace: &'ws Workspace,
        input: StagedAsset<'ws>,
        output_filename: &str,
        observer: &dyn PipelineObserver,
    ) -> Result<StagedAsset<'ws>, ConvertError> {
        let intermediate = input.with_extension(AssetStage::Intermediate, &self.intermediate_extension);
        let unpack = unpack_command(&self.unpack_tool, input.path(), intermediate.path());
        self.run_step(ConversionStep::Unpack, &unpack, observer).await?;
        drop(input);

        let output = workspace.stage(AssetStage::Output, output_filename);
        let export = export_command(&self.gltf_tool, intermediate.path(), output.path());
        self.run_step(ConversionStep::Export, &export, observer).await?;

        if let Err(e) = tokio::fs::remove_file(intermediate.path()).await {
            warn!(
                "Failed to remove intermediate {}: {}",
                intermediate.path().display(),
                e
            );
        } else {
            debug!("Removed intermediate {}", intermediate.path().display());
        }

        Ok(output)
    }

    async fn run_step(
        &self,
        step: ConversionStep,
        command: &ToolCommand,
        observer: &dyn PipelineObserver,
    ) -> Result<(), ConvertError> {
        info!("Running {}: {}", step, command.program);
        observer.on_tool_started(step, command);

        let exit = match self.invoker.invoke(command).await {
            Ok(exit) if exit.is_success() => return Ok(()),
            Ok(exit) => ExitInfo::Status {
                code: exit.code,
                stderr: exit.stderr,
            },
            Err(e) => ExitInfo::SpawnFailed {
                reason: e.to_string(),
            },
        };

        Err(ConvertError::ToolFailed {
            step,
            tool: command.program.clone(),
            exit,
        })
    }
}

/// `<tool> <input> --out <intermediate>`
pub fn unpack_command(tool: &str, input: &Path, intermediate: &Path) -> ToolCommand {
    ToolCommand::new(tool)
        .path_arg(input)
        .arg("--out")
        .path_arg(intermediate)
}

/// `<tool> --input <intermediate> --output <output>`
pub fn export_command(tool: &str, intermediate: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new(tool)
        .arg("--input")
        .path_arg(intermediate)
        .arg("--output")
        .path_arg(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::pipeline::tools::ToolExit;
    use crate::pipeline::workspace::WorkspaceManager;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Exits with a scripted code per program; on success writes a file at
    /// the last argument, as both real tools do.
    #[derive(Default)]
    struct ScriptedTools {
        codes: HashMap<String, i32>,
        calls: Mutex<Vec<ToolCommand>>,
    }

    impl ScriptedTools {
        fn failing(program: &str, code: i32) -> Self {
            Self {
                codes: HashMap::from([(program.to_string(), code)]),
                ..Self::default()
            }
        }

        fn programs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.program.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ToolInvoker for ScriptedTools {
        async fn invoke(&self, command: &ToolCommand) -> std::io::Result<ToolExit> {
            self.calls.lock().unwrap().push(command.clone());
            let code = self.codes.get(&command.program).copied().unwrap_or(0);
            if code == 0 {
                let out = command.args.last().expect("output path");
                std::fs::write(out, format!("written by {}", command.program))?;
                Ok(ToolExit::success())
            } else {
                Ok(ToolExit::failure(code, "scripted failure"))
            }
        }
    }

    fn runner(tools: Arc<ScriptedTools>) -> StageRunner {
        StageRunner::new(tools, &ConverterConfig::default())
    }

    fn stage_input<'ws>(ws: &'ws Workspace) -> StagedAsset<'ws> {
        let input = ws.stage(AssetStage::Input, "model.usdz");
        std::fs::write(input.path(), b"PK").unwrap();
        input
    }

    #[tokio::test]
    async fn both_steps_succeed_and_intermediate_removed() {
        let ws = WorkspaceManager::default().open().await.unwrap();
        let tools = Arc::new(ScriptedTools::default());

        let output = runner(tools.clone())
            .run(&ws, stage_input(&ws), "model.glb", &NoopObserver)
            .await
            .unwrap();

        assert_eq!(output.stage(), AssetStage::Output);
        assert_eq!(output.path(), ws.path().join("out/model.glb"));
        assert_eq!(
            std::fs::read_to_string(output.path()).unwrap(),
            "written by usd2gltf"
        );
        assert!(!ws.path().join("model.usd").exists());
        assert_eq!(tools.programs(), vec!["usdcat", "usd2gltf"]);

        let calls = tools.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            unpack_command(
                "usdcat",
                &ws.path().join("model.usdz"),
                &ws.path().join("model.usd")
            )
        );
        assert_eq!(
            calls[1],
            export_command(
                "usd2gltf",
                &ws.path().join("model.usd"),
                &ws.path().join("out/model.glb")
            )
        );
    }

    #[tokio::test]
    async fn step_one_failure_skips_step_two() {
        let ws = WorkspaceManager::default().open().await.unwrap();
        let tools = Arc::new(ScriptedTools::failing("usdcat", 1));

        let err = runner(tools.clone())
            .run(&ws, stage_input(&ws), "model.glb", &NoopObserver)
            .await
            .unwrap_err();

        match err {
            ConvertError::ToolFailed { step, tool, exit } => {
                assert_eq!(step, ConversionStep::Unpack);
                assert_eq!(tool, "usdcat");
                assert!(matches!(exit, ExitInfo::Status { code: Some(1), .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(tools.programs(), vec!["usdcat"]);
        assert!(!ws.path().join("out/model.glb").exists());
    }

    #[tokio::test]
    async fn step_two_failure_keeps_intermediate() {
        let ws = WorkspaceManager::default().open().await.unwrap();
        let tools = Arc::new(ScriptedTools::failing("usd2gltf", 2));

        let err = runner(tools.clone())
            .run(&ws, stage_input(&ws), "model.glb", &NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConvertError::ToolFailed {
                step: ConversionStep::Export,
                ..
            }
        ));
        assert!(ws.path().join("model.usd").exists());
    }

    #[tokio::test]
    async fn missing_tool_is_spawn_failure() {
        let ws = WorkspaceManager::default().open().await.unwrap();
        let config = ConverterConfig::builder()
            .unpack_tool("usdz2glb-no-such-tool-on-path")
            .build()
            .unwrap();
        let runner = StageRunner::new(Arc::new(crate::pipeline::tools::ProcessToolInvoker), &config);

        let err = runner
            .run(&ws, stage_input(&ws), "model.glb", &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::ToolFailed {
                step: ConversionStep::Unpack,
                exit: ExitInfo::SpawnFailed { .. },
                ..
            }
        ));
    }
}

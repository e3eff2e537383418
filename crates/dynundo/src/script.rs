/// Script steps driving the demo scene, and the scene they run against.
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dynundo_history::config::stack_key;
use dynundo_history::{ManagerHandle, StackStore, UndoConfig, UndoManager, UndoSuperManager};

use crate::pose::{Body, Pose};

type PoseManager = UndoManager<Pose>;

/// Store key of the scene's merged timeline.
const SCENE_KEY: &str = "scene";

/// One scripted user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Drag a body to a new position.
    Move { body: String, to: [f32; 3] },
    /// Rotate a body about the vertical axis.
    Turn { body: String, degrees: f32 },
    /// Set a body's uniform scale.
    Scale { body: String, factor: f32 },
    /// Record the body's current pose.
    Push { body: String },
    Undo,
    Redo,
    /// Advance this many frames.
    Tick { frames: u32 },
    Save,
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let verb = parts.next().unwrap_or_default();
        let body = parts.next().map(str::to_string);
        let arg = parts.next();

        let step = match (verb, body, arg) {
            ("undo", None, None) => Step::Undo,
            ("redo", None, None) => Step::Redo,
            ("save", None, None) => Step::Save,
            ("tick", Some(frames), None) => Step::Tick {
                frames: frames
                    .parse()
                    .with_context(|| format!("Invalid frame count '{frames}'"))?,
            },
            ("push", Some(body), None) => Step::Push { body },
            ("move", Some(body), Some(arg)) => Step::Move {
                body,
                to: parse_vector(arg)?,
            },
            ("turn", Some(body), Some(arg)) => Step::Turn {
                body,
                degrees: parse_number(arg)?,
            },
            ("scale", Some(body), Some(arg)) => Step::Scale {
                body,
                factor: parse_number(arg)?,
            },
            _ => bail!("Unrecognized step '{s}'"),
        };
        Ok(step)
    }
}

fn parse_number(s: &str) -> Result<f32> {
    s.trim()
        .parse()
        .with_context(|| format!("Invalid number '{s}'"))
}

fn parse_vector(s: &str) -> Result<[f32; 3]> {
    let values = s
        .split(',')
        .map(parse_number)
        .collect::<Result<Vec<f32>>>()?;
    match values.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => bail!("Expected x,y,z but got '{s}'"),
    }
}

/// Bodies under one coordinator, animated frame by frame.
pub struct Scene {
    bodies: Vec<(Body, ManagerHandle)>,
    coordinator: UndoSuperManager,
    frame_time: f32,
}

impl Scene {
    /// Restores (or creates) the scene's managers and applies each body's
    /// restored pose.
    pub fn open(
        names: &[&str],
        config: &UndoConfig,
        store: Option<Arc<dyn StackStore>>,
        fps: u32,
    ) -> Result<Self> {
        if fps == 0 {
            bail!("Frame rate must be positive");
        }

        let mut coordinator = UndoSuperManager::load_or_new(stack_key(SCENE_KEY), store.clone());
        let mut bodies = Vec::with_capacity(names.len());

        for name in names {
            let manager = PoseManager::load_or_new(stack_key(name), config.clone(), store.clone());
            let handle = coordinator
                .add_manager(manager)
                .with_context(|| format!("Failed to register body '{name}'"))?;

            let mut body = Body::new(*name);
            coordinator.with_manager::<PoseManager, _>(handle, |m| {
                if let Some(pose) = m.target() {
                    pose.apply(&mut body);
                }
                m.start(&body);
            });
            bodies.push((body, handle));
        }

        tracing::info!(
            "Opened scene with {} bodies, {} recorded actions",
            bodies.len(),
            coordinator.len()
        );
        Ok(Self {
            bodies,
            coordinator,
            frame_time: 1.0 / fps as f32,
        })
    }

    pub fn run(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Move { body, to } => self.body_mut(body)?.position = *to,
            Step::Turn { body, degrees } => self.body_mut(body)?.turn(*degrees),
            Step::Scale { body, factor } => self.body_mut(body)?.scale = [*factor; 3],
            Step::Push { body } => {
                let index = self.index_of(body)?;
                let (body, handle) = &self.bodies[index];
                let pushed = self
                    .coordinator
                    .with_manager::<PoseManager, _>(*handle, |m| m.push(body))
                    .unwrap_or(false);
                if !pushed {
                    tracing::warn!("Push on '{}' was rejected", body.name);
                }
            }
            Step::Undo => {
                if !self.coordinator.undo() {
                    tracing::info!("Nothing to undo");
                }
            }
            Step::Redo => {
                if !self.coordinator.redo() {
                    tracing::info!("Nothing to redo");
                }
            }
            Step::Tick { frames } => {
                for _ in 0..*frames {
                    self.tick();
                }
            }
            Step::Save => {
                self.coordinator.save().context("Failed to save scene")?;
                tracing::info!("Saved scene");
            }
        }
        Ok(())
    }

    /// Advances one frame and moves every animating body along its
    /// transition.
    pub fn tick(&mut self) {
        let animating: Vec<bool> = self
            .bodies
            .iter()
            .map(|(_, handle)| {
                self.coordinator
                    .child(*handle)
                    .is_some_and(|child| child.state().is_active())
            })
            .collect();

        self.coordinator.tick(self.frame_time);

        for ((body, handle), was_animating) in self.bodies.iter_mut().zip(animating) {
            if !was_animating {
                continue;
            }
            let Some(manager) = self.coordinator.manager::<PoseManager>(*handle) else {
                continue;
            };
            if let Some((source, target, progress)) = manager.frame() {
                source.lerp(target, progress).apply(body);
            }
        }
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter().map(|(body, _)| body)
    }

    pub fn coordinator(&self) -> &UndoSuperManager {
        &self.coordinator
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        match self.bodies.iter().position(|(body, _)| body.name == name) {
            Some(index) => Ok(index),
            None => bail!("Unknown body '{name}'"),
        }
    }

    fn body_mut(&mut self, name: &str) -> Result<&mut Body> {
        let index = self.index_of(name)?;
        Ok(&mut self.bodies[index].0)
    }
}

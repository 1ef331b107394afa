use anyhow::bail;
use glam::Vec3;

use super::{Effect, EffectInputs};
use crate::animation::{FrameContext, Priority};

const ROW_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct CrowdMember {
    pub home: Vec3,
    pub position: Vec3,
    pub phase: f32,
    pub visible: bool,
}

/// A grid of figures that bounce with the bass and jump on beats.
///
/// The crowd grows or shrinks to the current `max_crowd` budget, capped by
/// its own capacity.
pub struct CrowdEffect {
    members: Vec<CrowdMember>,
    inputs: EffectInputs,
    capacity: usize,
    spacing: f32,
    jump_height: f32,
    view_distance: f32,
    time: f32,
}

impl CrowdEffect {
    pub fn new(capacity: usize) -> Self {
        Self {
            members: Vec::with_capacity(capacity),
            inputs: EffectInputs::default(),
            capacity,
            spacing: 1.5,
            jump_height: 0.8,
            view_distance: 60.0,
            time: 0.0,
        }
    }

    pub fn members(&self) -> &[CrowdMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.members.iter().filter(|m| m.visible).count()
    }

    pub fn inputs(&self) -> &EffectInputs {
        &self.inputs
    }

    fn resize(&mut self, target: usize) {
        if target < self.members.len() {
            self.members.truncate(target);
            return;
        }
        let half_row = ROW_LEN as f32 * self.spacing / 2.0;
        for i in self.members.len()..target {
            let home = Vec3::new(
                (i % ROW_LEN) as f32 * self.spacing - half_row,
                0.0,
                -((i / ROW_LEN) as f32) * self.spacing,
            );
            self.members.push(CrowdMember {
                home,
                position: home,
                phase: i as f32 * 0.37,
                visible: true,
            });
        }
    }
}

impl Default for CrowdEffect {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Effect for CrowdEffect {
    fn id(&self) -> &str {
        "crowd"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn update(&mut self, ctx: &FrameContext) -> anyhow::Result<()> {
        if !ctx.delta_seconds.is_finite() {
            bail!("non-finite frame delta {}", ctx.delta_seconds);
        }
        self.inputs.update_inputs(&ctx.audio, ctx.now_ms);
        self.time += self.inputs.delta_seconds;
        self.resize(ctx.quality.max_crowd.min(self.capacity));

        let energy = self.inputs.bass * 0.6 + self.inputs.beat_pulse * 0.4;
        let lift = self.jump_height * energy;
        for member in &mut self.members {
            let sway = 0.5 + 0.5 * (self.time * 6.0 + member.phase).sin();
            member.position = member.home + Vec3::Y * (lift * sway);
            member.visible = member.position.distance(ctx.camera) <= self.view_distance;
        }
        Ok(())
    }
}

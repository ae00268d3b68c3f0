use crate::config::JumpingSettings;

/// Facts the jump rule needs at the before-move point of a tick
#[derive(Debug, Clone, Copy)]
pub struct JumpContext {
    pub now: f32,
    pub grounded: bool,
    pub walking: bool,
    pub sliding: bool,
    pub ceiling: bool,
}

/// Jump buffering and ground grace bookkeeping
#[derive(Debug, Default)]
pub struct Jumping {
    trying_to_jump: bool,
    last_press_time: Option<f32>,
    last_grounded_time: Option<f32>,
    jumps: u32,
}

fn within(since: Option<f32>, now: f32, window: f32) -> bool {
    since.is_some_and(|t| now - t < window)
}

impl Jumping {
    pub fn press(&mut self, now: f32) {
        self.trying_to_jump = true;
        self.last_press_time = Some(now);
    }

    pub fn on_ungrounded(&mut self, now: f32) {
        self.last_grounded_time = Some(now);
    }

    pub fn jumps(&self) -> u32 {
        self.jumps
    }

    /// Decides whether to jump this tick. Consumes the press either way.
    pub fn before_move(&mut self, ctx: JumpContext, settings: &JumpingSettings) -> bool {
        if ctx.grounded {
            self.jumps = 0;
        }

        let was_trying = within(self.last_press_time, ctx.now, settings.press_buffer_time);
        let was_grounded = within(self.last_grounded_time, ctx.now, settings.ground_grace_time);
        let trying = self.trying_to_jump || (was_trying && ctx.grounded);
        let can_jump = self.jumps < settings.max_jumps
            && trying
            && (ctx.grounded || was_grounded)
            && ctx.walking
            && !ctx.sliding
            && !ctx.ceiling;

        if can_jump {
            self.jumps += 1;
        }
        self.trying_to_jump = false;
        can_jump
    }
}

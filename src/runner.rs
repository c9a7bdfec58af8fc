/*
 *  runner.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Polling loop: button sampling, ticks, rendering, shutdown
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::time::{self, MissedTickBehavior};

use crate::button::ButtonSource;
use crate::controller::DashController;
use crate::display::RenderSink;

/// How often the button level is sampled
pub const BUTTON_SAMPLE: Duration = Duration::from_millis(10);

/// Drive `dash` every `poll` until `shutdown` resolves, then release the
/// datalog and blank the sink. Render failures are logged, never fatal.
pub async fn run<F>(
    dash: &mut DashController,
    sink: &mut dyn RenderSink,
    mut button: Option<&mut dyn ButtonSource>,
    poll: Duration,
    shutdown: F,
) where
    F: Future,
{
    tokio::pin!(shutdown);

    let mut poll_tick = time::interval(poll);
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sample_tick = time::interval(BUTTON_SAMPLE);
    sample_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut render_failing = false;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Stopping dashboard loop");
                break;
            }
            _ = poll_tick.tick() => {
                let frame = dash.tick(Instant::now());
                match sink.render(&frame) {
                    Ok(()) if render_failing => {
                        info!("Display recovered");
                        render_failing = false;
                    }
                    Ok(()) => {}
                    Err(e) if !render_failing => {
                        warn!("Render failed: {}", e);
                        render_failing = true;
                    }
                    Err(e) => debug!("Render still failing: {}", e),
                }
            }
            _ = sample_tick.tick(), if button.is_some() => {
                let event = button.as_deref_mut().and_then(|b| b.poll(Instant::now()));
                if let Some(event) = event {
                    debug!("button: {:?}", event);
                    dash.on_button_event(event);
                    // show the new selection without waiting out the period
                    poll_tick.reset_immediately();
                }
            }
        }
    }

    dash.shutdown();
    if let Err(e) = sink.release() {
        warn!("Failed to release display: {}", e);
    }
}

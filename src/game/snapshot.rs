//! Outbound message building from race state

use std::collections::HashMap;

use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::protocol::{HovercraftSnapshot, ServerMsg};

use super::race::{Player, Race, RaceState};

impl HovercraftSnapshot {
    fn of(player: &Player) -> Self {
        let craft = &player.hovercraft;
        Self {
            pos: craft.pos,
            velocity: craft.vel,
            thrust: craft.throttle,
            angle: craft.angle,
            checkpoints_left: player.remaining_checkpoints.len(),
        }
    }
}

impl Race {
    /// Every hovercraft still in the race
    pub fn hovercrafts_msg(&self) -> ServerMsg {
        let hovercrafts: HashMap<Uuid, HovercraftSnapshot> = self
            .active_players()
            .map(|p| (p.id, HovercraftSnapshot::of(p)))
            .collect();

        ServerMsg::Hovercrafts {
            hovercrafts,
            time: unix_millis(),
        }
    }

    pub fn ready_players_msg(&self) -> ServerMsg {
        let players = self.ready_player_ids();
        let everyone = !self.players.is_empty() && players.len() == self.players.len();
        ServerMsg::ReadyPlayers { players, everyone }
    }

    pub fn ranking_msg(&self) -> ServerMsg {
        ServerMsg::FinishedPlayers {
            players: self.ranking.clone(),
        }
    }

    /// Ranking plus everyone who did not finish, in join order
    pub fn summary_msg(&self) -> ServerMsg {
        let unfinished = self
            .roster_order()
            .into_iter()
            .filter(|id| self.players.get(id).is_some_and(|p| !p.finished))
            .collect();

        ServerMsg::GameOver {
            finished: self.ranking.clone(),
            unfinished,
        }
    }

    /// Checkpoints as seen by `player_id`; spectators get the shared pool
    pub fn checkpoints_msg(&self, player_id: Option<Uuid>) -> ServerMsg {
        let checkpoints = player_id
            .and_then(|id| self.players.get(&id))
            .map(|p| p.remaining_checkpoints.clone())
            .unwrap_or_else(|| self.checkpoints.clone());

        ServerMsg::Checkpoints {
            checkpoints,
            finish_line: self.finish_line,
        }
    }

    /// What a late connection needs to render the current state
    pub fn catch_up(&self, player_id: Option<Uuid>) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        match self.state {
            RaceState::Waiting => {
                if !self.ready_player_ids().is_empty() {
                    msgs.push(self.ready_players_msg());
                }
            }
            RaceState::Countdown => {
                msgs.push(self.hovercrafts_msg());
                msgs.push(self.checkpoints_msg(player_id));
            }
            RaceState::Running => {
                msgs.push(self.hovercrafts_msg());
                msgs.push(self.checkpoints_msg(player_id));
                msgs.push(ServerMsg::InProgress);
                if !self.ranking.is_empty() {
                    msgs.push(self.ranking_msg());
                }
            }
            RaceState::Finished => {
                msgs.push(self.summary_msg());
            }
        }
        msgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::testing::RecordingSessions;
    use crate::game::RaceConfig;

    #[test]
    fn snapshot_reports_motion_and_progress() {
        let sessions = RecordingSessions::default();
        let mut race = Race::new(Uuid::new_v4(), RaceConfig::default(), 10, 5);
        let id = Uuid::new_v4();
        race.join(id, "solo".into(), &sessions).unwrap();
        {
            let player = race.players.get_mut(&id).unwrap();
            player.hovercraft.vel = crate::game::vector::Vec2::new(3.0, 4.0);
            player.hovercraft.throttle = 0.5;
            player.remaining_checkpoints = vec![Default::default(); 4];
        }

        let ServerMsg::Hovercrafts { hovercrafts, time } = race.hovercrafts_msg() else {
            panic!("expected hovercrafts");
        };
        let snap = &hovercrafts[&id];
        assert_eq!(snap.velocity.magnitude(), 5.0);
        assert_eq!(snap.thrust, 0.5);
        assert_eq!(snap.checkpoints_left, 4);
        assert!(time > 0);
    }

    #[test]
    fn finished_catch_up_is_the_summary() {
        let sessions = RecordingSessions::default();
        let mut race = Race::new(Uuid::new_v4(), RaceConfig::default(), 10, 5);
        let id = Uuid::new_v4();
        race.join(id, "solo".into(), &sessions).unwrap();
        race.finish(&sessions);

        assert_eq!(
            race.catch_up(None),
            vec![ServerMsg::GameOver {
                finished: vec![],
                unfinished: vec![id],
            }]
        );
    }

    #[test]
    fn empty_lobby_has_nothing_to_catch_up() {
        let race = Race::new(Uuid::new_v4(), RaceConfig::default(), 10, 5);
        assert!(race.catch_up(None).is_empty());
    }
}

//! Wire event parsing and the trigger sum type.
//!
//! Wire format: `seq|T[|arg1[|arg2]]\n`. `seq` is a positive decimal u64,
//! `T` is a single uppercase ASCII letter naming the variant, and the
//! argument count is fixed per variant.

use bytes::Bytes;

use crate::error::ParseError;
use crate::router::Router;

/// One parsed line from the event source: its sequence number, the action
/// it triggers, and the original raw bytes (terminator included) that get
/// delivered verbatim to recipients.
#[derive(Debug, Clone)]
pub struct Event {
    pub seq: u64,
    pub trigger: Trigger,
    pub raw: Bytes,
}

/// The five event variants and the Router operations they drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Follow { follower: i64, followed: i64 },
    Unfollow { follower: i64, followed: i64 },
    Broadcast,
    PrivateMsg { to: i64 },
    StatusUpdate { user: i64 },
}

impl Trigger {
    /// Apply this trigger to the router, delivering `raw` to whatever
    /// recipient set the variant implies.
    pub async fn dispatch(self, raw: Bytes, router: &Router) {
        match self {
            Trigger::Follow { follower, followed } => {
                router.follow(follower, followed).await;
                router.send_msg(followed, raw).await;
            }
            Trigger::Unfollow { follower, followed } => {
                router.unfollow(follower, followed).await;
            }
            Trigger::Broadcast => {
                router.broadcast(raw).await;
            }
            Trigger::PrivateMsg { to } => {
                router.send_msg(to, raw).await;
            }
            Trigger::StatusUpdate { user } => {
                router.send_to_followers(user, raw).await;
            }
        }
    }
}

/// Parse a single raw line (terminator included) into an [`Event`].
pub fn parse(line: &[u8]) -> Result<Event, ParseError> {
    let text = std::str::from_utf8(line).map_err(|_| ParseError::BadFormat)?;
    let trimmed = text.strip_suffix('\n').unwrap_or(text);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);

    let mut fields = trimmed.split('|');
    let seq: u64 = fields
        .next()
        .ok_or(ParseError::BadFormat)?
        .parse()
        .map_err(|_| ParseError::BadFormat)?;
    if seq == 0 {
        return Err(ParseError::BadFormat);
    }

    let type_str = fields.next().ok_or(ParseError::BadFormat)?;
    let mut chars = type_str.chars();
    let (Some(t), None) = (chars.next(), chars.next()) else {
        return Err(ParseError::BadFormat);
    };

    let args: Vec<&str> = fields.collect();

    let trigger = match t {
        'F' => {
            expect_args(&args, 2)?;
            Trigger::Follow {
                follower: parse_arg(args[0])?,
                followed: parse_arg(args[1])?,
            }
        }
        'U' => {
            expect_args(&args, 2)?;
            Trigger::Unfollow {
                follower: parse_arg(args[0])?,
                followed: parse_arg(args[1])?,
            }
        }
        'B' => {
            expect_args(&args, 0)?;
            Trigger::Broadcast
        }
        'P' => {
            expect_args(&args, 2)?;
            parse_arg(args[0])?; // from, validated but not retained
            Trigger::PrivateMsg {
                to: parse_arg(args[1])?,
            }
        }
        'S' => {
            expect_args(&args, 1)?;
            Trigger::StatusUpdate {
                user: parse_arg(args[0])?,
            }
        }
        other => return Err(ParseError::UnknownEventType(other)),
    };

    Ok(Event {
        seq,
        trigger,
        raw: Bytes::copy_from_slice(line),
    })
}

fn expect_args(args: &[&str], want: usize) -> Result<(), ParseError> {
    if args.len() != want {
        return Err(ParseError::BadArgumentCount {
            want,
            got: args.len(),
        });
    }
    Ok(())
}

fn parse_arg(s: &str) -> Result<i64, ParseError> {
    s.parse().map_err(|_| ParseError::BadFormat)
}

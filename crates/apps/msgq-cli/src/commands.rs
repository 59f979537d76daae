use anyhow::{Context, Result};
use msgq::{
    BlockingMode, CodecKind, IdentityCodec, JsonCodec, MsgPackCodec, QueueBuilder, QueueConfig,
    QueueError, ReceiveError, TypeSelector,
};

use crate::app::{Cli, Command};
use crate::codec::CliCodec;
use crate::output::Output;

fn blocking(nowait: bool) -> BlockingMode {
    if nowait {
        BlockingMode::NonBlocking
    } else {
        BlockingMode::Blocking
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = cli.target.resolve()?;
    let output = Output::new(cli.json, cli.quiet);
    log::debug!(
        "msgqctl: {} id {} codec {}",
        config.path.display(),
        config.discriminator,
        config.codec
    );
    match config.codec {
        CodecKind::Identity => execute(&config, IdentityCodec, &cli.command, &output),
        CodecKind::Json => execute(
            &config,
            JsonCodec::<serde_json::Value>::new(),
            &cli.command,
            &output,
        ),
        CodecKind::MsgPack => execute(
            &config,
            MsgPackCodec::<rmpv::Value>::new(),
            &cli.command,
            &output,
        ),
    }
}

fn execute<C: CliCodec>(
    config: &QueueConfig,
    codec: C,
    command: &Command,
    output: &Output,
) -> Result<()> {
    let queue = QueueBuilder::from_config(config)
        .build(codec)
        .with_context(|| format!("opening queue at {}", config.path.display()))?;

    match command {
        Command::Send {
            value,
            kind,
            nowait,
        } => {
            let item = queue.codec().parse(value)?;
            queue
                .put_with(&item, TypeSelector::new(*kind), blocking(*nowait))
                .context("send failed")?;
        }
        Command::Recv { kind, nowait } => {
            let (received, item) = queue
                .get_message(TypeSelector::new(*kind), blocking(*nowait))
                .context("receive failed")?;
            output.emit_item(received.get(), &queue.codec().render(&item)?)?;
        }
        Command::Drain { kind } => {
            let mut count = 0usize;
            loop {
                match queue.get_message(TypeSelector::new(*kind), BlockingMode::NonBlocking) {
                    Ok((received, item)) => {
                        output.emit_item(received.get(), &queue.codec().render(&item)?)?;
                        count += 1;
                    }
                    Err(QueueError::Receive(ReceiveError::NoMessage)) => break,
                    Err(err) => return Err(err).context("drain failed"),
                }
            }
            log::info!("msgqctl: drained {count} message(s)");
        }
        Command::Stat => {
            let stat = queue.stat().context("stat failed")?;
            output.emit_status(&stat)?;
        }
        Command::Remove => {
            let key = queue.key();
            queue.remove().context("remove failed")?;
            output.emit_message(format!("removed queue {key}"));
        }
    }
    Ok(())
}
